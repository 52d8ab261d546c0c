//! Prompt text handed back to the MCP client. The core treats the result as an opaque string.

use chrono::{DateTime, Datelike, Local, TimeZone};

use crate::analysis::{
    TaskAnalysis, COMPLEXITY_MAX, COMPLEXITY_MIN, TASK_NAME_MAX_CHARS, TASK_NAME_MIN_CHARS,
};
use crate::config::Settings;
use crate::identity::TaskId;
use crate::record::{scoring_legend, SCORE_MAX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeContext {
    pub date: String,
    pub time: String,
    pub weekday: String,
    pub timezone: String,
    pub year: i32,
    pub quarter: u32,
}

impl TimeContext {
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    pub fn from_datetime<Tz>(now: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M").to_string(),
            weekday: now.format("%A").to_string(),
            timezone: now.format("%:z").to_string(),
            year: now.year(),
            quarter: (now.month() - 1) / 3 + 1,
        }
    }

    fn render(&self) -> String {
        format!(
            "- Date: {date} ({weekday})\n- Time: {time} (UTC{timezone})\n- Period: Q{quarter} {year}\n",
            date = self.date,
            weekday = self.weekday,
            time = self.time,
            timezone = self.timezone,
            quarter = self.quarter,
            year = self.year
        )
    }
}

/// Stage one: asks the LLM to extract a TaskAnalysis JSON object from the conversation.
pub fn render_analysis_prompt(user_message: &str, history: Option<&str>) -> String {
    let history = history
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("(no earlier conversation)");
    format!(
        r#"# Task Analysis

Identify the task the user wants done and describe it as structured data.

## Latest user message
{user_message}

## Conversation history
{history}

## Output
Reply with a single JSON object and nothing else:

```json
{{
  "coreTask": "one sentence describing what must be produced",
  "taskName": "short name, {name_min}-{name_max} characters",
  "taskType": "e.g. writing, coding, analysis, design, planning",
  "complexity": {complexity_min},
  "domain": "subject area of the task",
  "keyElements": ["element the result must contain"],
  "objectives": ["what a successful result achieves"]
}}
```

Rules:
- `complexity` is an integer from {complexity_min} (trivial) to {complexity_max} (very complex).
- `taskName` must be {name_min}-{name_max} characters; it is used in file names.
- Use empty arrays when there are no key elements or objectives.
- Then call `generate_dimensions` with this JSON as `task_analysis`.
"#,
        user_message = user_message.trim(),
        history = history,
        name_min = TASK_NAME_MIN_CHARS,
        name_max = TASK_NAME_MAX_CHARS,
        complexity_min = COMPLEXITY_MIN,
        complexity_max = COMPLEXITY_MAX,
    )
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none)\n".to_string();
    }
    items.iter().map(|item| format!("- {}\n", item)).collect()
}

pub struct DimensionPromptInput<'a> {
    pub analysis: &'a TaskAnalysis,
    pub time: &'a TimeContext,
    pub settings: Settings,
    pub task_id: Option<&'a TaskId>,
}

/// Stage two: asks the LLM for a refined task description plus the evaluation dimensions.
pub fn render_dimension_prompt(input: &DimensionPromptInput<'_>) -> String {
    let analysis = input.analysis;
    let count = input.settings.dimension_count;
    let save_step = match input.task_id {
        Some(task_id) => format!(
            "Finally call `save_task_record` with task_id `{task_id}`, task_name `{name}`, \
the refined description as `refined_description` and the dimensions as `dimensions`.",
            task_id = task_id,
            name = analysis.task_name
        ),
        None => "Finally call `save_task_record` with both documents.".to_string(),
    };
    format!(
        r#"# Evaluation Dimensions: {name}

## Time context
{time}
## Task
- Core task: {core_task}
- Type: {task_type}
- Domain: {domain}
- Complexity: {complexity}/{complexity_max}

### Key elements
{key_elements}
### Objectives
{objectives}
## Step 1: Refined task description
Rewrite the task as a precise, self-contained description under a `## Task` heading.
Resolve relative dates against the time context above.

## Step 2: Evaluation dimensions
Under a `## Dimensions` heading, define exactly {count} numbered dimensions for judging the result.
For each dimension give a name, what it measures, and what distinguishes a 6, an 8 and a 10.
The result is expected to reach an overall score of {expected_score} out of {score_max}.

Scoring convention (fixed):
{legend}
## Step 3
{save_step}
"#,
        name = analysis.task_name,
        time = input.time.render(),
        core_task = analysis.core_task,
        task_type = analysis.task_type,
        domain = analysis.domain,
        complexity = analysis.complexity,
        complexity_max = COMPLEXITY_MAX,
        key_elements = bullet_list(&analysis.key_elements),
        objectives = bullet_list(&analysis.objectives),
        count = count,
        expected_score = input.settings.expected_score,
        score_max = SCORE_MAX,
        legend = scoring_legend(),
        save_step = save_step,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn analysis() -> TaskAnalysis {
        TaskAnalysis {
            core_task: "Write a blog post about Rust".to_string(),
            task_name: "Rust Blog".to_string(),
            task_type: "writing".to_string(),
            complexity: 3,
            domain: "software".to_string(),
            key_elements: vec!["examples".to_string()],
            objectives: Vec::new(),
        }
    }

    #[test]
    fn time_context_derives_quarter_and_weekday() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let time = TimeContext::from_datetime(&at);
        assert_eq!(time.date, "2026-10-18");
        assert_eq!(time.weekday, "Sunday");
        assert_eq!(time.quarter, 4);
        assert_eq!(time.timezone, "+00:00");
    }

    #[test]
    fn analysis_prompt_embeds_message_and_constraints() {
        let prompt = render_analysis_prompt("Help me write release notes", None);
        assert!(prompt.contains("Help me write release notes"));
        assert!(prompt.contains("(no earlier conversation)"));
        assert!(prompt.contains("\"taskName\""));
        assert!(prompt.contains("3-15 characters"));
    }

    #[test]
    fn dimension_prompt_uses_settings_and_task_id() {
        let analysis = analysis();
        let time = TimeContext::from_datetime(&Utc.with_ymd_and_hms(2026, 1, 2, 8, 0, 0).unwrap());
        let task_id = TaskId::parse("task_1700000000000_abc12345").unwrap();
        let prompt = render_dimension_prompt(&DimensionPromptInput {
            analysis: &analysis,
            time: &time,
            settings: Settings {
                dimension_count: 7,
                expected_score: 9.0,
            },
            task_id: Some(&task_id),
        });
        assert!(prompt.contains("exactly 7 numbered dimensions"));
        assert!(prompt.contains("overall score of 9 out of 10"));
        assert!(prompt.contains("task_1700000000000_abc12345"));
        assert!(prompt.contains("- examples"));
        assert!(prompt.contains("- (none)"));
        assert!(prompt.contains("Q1 2026"));
    }
}
