//! Prompt templates for the agent.

use serde_json::Value;

use crate::jobs::Job;
use crate::tools::ToolRegistry;

/// Build the instruction prompt for an LLM-directed job.
///
/// A payload that names a tool gets a prompt demanding exactly that call;
/// anything else gets the task description and the full tool menu.
pub fn build_job_prompt(job: &Job, tools: &ToolRegistry) -> String {
    match job.tool_name() {
        Some(tool_name) => build_explicit_tool_prompt(tool_name, &job.tool_args()),
        None => build_tool_selection_prompt(&job.task_description(), tools),
    }
}

fn build_explicit_tool_prompt(tool_name: &str, tool_args: &Value) -> String {
    let call = format!(
        r#"{{"name": {}, "arguments": {}}}"#,
        Value::from(tool_name),
        tool_args
    );

    format!(
        r#"You are an AI agent that completes tasks by calling the provided tools.

## Instructions
1. Use the **designated tool** below to perform the task.
2. Call exactly this tool and no other.
3. Respond with nothing but the JSON object that calls the tool.

## Designated tool
{tool_name}

## Response format
{call}"#
    )
}

fn build_tool_selection_prompt(description: &str, tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| {
            let args = t.argument_names();
            if args.is_empty() {
                format!("- {}: {}", t.name, t.description)
            } else {
                format!(
                    "- {}: {} (arguments: {})",
                    t.name,
                    t.description,
                    args.join(", ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an AI agent that completes tasks by calling the provided tools.

## Instructions
1. Analyse the task below.
2. Choose the **single** tool from the list of available tools that best solves it.
3. Respond with nothing but the JSON object that calls the chosen tool.

## Task
{description}

## Available tools
{tool_descriptions}

## Response format
Respond with exactly one of these JSON shapes.

- For a tool without arguments:
{{"name": "tool_name", "arguments": {{}}}}

- For a tool with arguments:
{{"name": "tool_name", "arguments": {{"argument_name": "value", ...}}}}"#
    )
}

/// Prompt asking the model to interpret a tool's raw output, for tools on
/// the analyzable list. `None` for every other tool.
pub fn build_analysis_prompt(tool_name: &str, result: &str) -> Option<String> {
    let prompt = match tool_name {
        "calculate_loc_per_language" => format!(
            r#"Below is the lines-of-code (LOC) breakdown per language for a repository.

Result: {result}

Analyse and interpret this result in natural language. For example:
- Which language has the most code?
- What is the project's technology stack?
- Roughly what share does each language have?"#
        ),
        "get_diff" => format!(
            r#"Below is the change set (diff) retrieved from a repository.

Result: {result}

Summarise this diff in natural language. For example:
- Which files changed?
- What are the main changes?
- How large is the change?"#
        ),
        _ => return None,
    };
    Some(prompt)
}

/// Message content carrying a tool result back to the model.
pub fn tool_result_message(tool_name: &str, output: &str) -> String {
    format!(
        "Result of tool `{tool_name}`:\n{output}\n\nIf the task is complete, answer in plain text. Otherwise respond with the next tool call as JSON."
    )
}
