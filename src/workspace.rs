//! Local repository bootstrap.
//!
//! When the configured repository does not exist yet, a small sample Git
//! repository is created there so the tools have something to work on.

use std::path::Path;

use crate::tools::{git_output, run_git_command};

const SAMPLE_FILES: &[(&str, &str)] = &[
    (
        "README.md",
        "# Test Repository\n\nThis is a test repository for git analysis.\n",
    ),
    (
        "src/main.py",
        "def hello():\n    print('Hello, World!')\n\nif __name__ == '__main__':\n    hello()\n",
    ),
    (
        "src/utils.py",
        "def add(a, b):\n    return a + b\n\ndef subtract(a, b):\n    return a - b\n",
    ),
    (
        "tests/test_main.py",
        "import unittest\nfrom src.main import hello\n\nclass TestMain(unittest.TestCase):\n    def test_hello(self):\n        self.assertTrue(True)\n",
    ),
    (
        "config.json",
        "{\"name\": \"test-project\", \"version\": \"1.0.0\"}\n",
    ),
    (".gitignore", "__pycache__/\n*.pyc\n.venv/\n"),
];

const BOT_NAME: &str = "Agent Bot";
const BOT_EMAIL: &str = "agent@bot.local";

/// Make sure `repo` is usable by the repository tools.
///
/// A missing path becomes a fresh repository holding the sample files in a
/// single commit. An existing Git repository only gets a committer identity
/// if it has none; anything else at the path is left alone.
pub async fn ensure_sample_repo(repo: &Path) -> anyhow::Result<()> {
    if tokio::fs::try_exists(repo).await? {
        if tokio::fs::try_exists(repo.join(".git")).await? {
            ensure_identity(repo).await?;
        }
        return Ok(());
    }

    tracing::warn!(
        repo = %repo.display(),
        "Repository not found, initializing a sample repository"
    );
    tokio::fs::create_dir_all(repo).await?;
    run_git_command(&["init", "-q"], repo).await?;

    let mut paths = Vec::with_capacity(SAMPLE_FILES.len());
    for (path, content) in SAMPLE_FILES {
        let full_path = repo.join(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, content).await?;
        tracing::debug!(file = path, "Created sample file");
        paths.push(*path);
    }

    ensure_identity(repo).await?;

    let mut add = vec!["add", "--"];
    add.extend(paths);
    run_git_command(&add, repo).await?;
    run_git_command(&["commit", "-q", "-m", "Initial commit with sample files"], repo).await?;

    tracing::info!(repo = %repo.display(), "Sample files committed");
    Ok(())
}

/// Set a repository-local committer name and email for whichever of the two
/// git has no value for.
async fn ensure_identity(repo: &Path) -> anyhow::Result<()> {
    for (key, fallback) in [("user.name", BOT_NAME), ("user.email", BOT_EMAIL)] {
        let current = git_output(&["config", key], repo).await?;
        if current.status.success() && !current.stdout.trim_ascii().is_empty() {
            continue;
        }
        run_git_command(&["config", key, fallback], repo).await?;
        tracing::debug!(key, "Git user config set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git(repo: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .expect("git must be installed to run these tests");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    #[tokio::test]
    async fn missing_path_becomes_committed_sample_repo() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("sample");

        ensure_sample_repo(&repo).await.unwrap();

        for (path, _) in SAMPLE_FILES {
            assert!(repo.join(path).is_file(), "missing {}", path);
        }
        assert_eq!(
            git(&repo, &["log", "-1", "--format=%s"]),
            "Initial commit with sample files"
        );
        assert_eq!(git(&repo, &["status", "--porcelain"]), "");
        let tracked = git(&repo, &["ls-files"]);
        assert!(tracked.contains("src/utils.py"));
        assert!(tracked.contains(".gitignore"));
    }

    #[tokio::test]
    async fn existing_plain_directory_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        ensure_sample_repo(dir.path()).await.unwrap();

        assert!(!dir.path().join(".git").exists());
        assert!(!dir.path().join("README.md").exists());
    }

    #[tokio::test]
    async fn existing_repo_keeps_its_name_and_gains_an_email() {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["config", "user.name", "Someone Else"]);

        ensure_sample_repo(dir.path()).await.unwrap();

        assert_eq!(git(dir.path(), &["config", "user.name"]), "Someone Else");
        assert!(!dir.path().join("README.md").exists());
        assert!(!git(dir.path(), &["config", "user.email"]).is_empty());
    }
}
