use std::str::FromStr;

use chrono::Utc;
use mstrade_models::research::{Action, ResearchReport, ResearchTask};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::AgentError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common Claude response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if serde_json::from_str::<Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    if let Some(json_str) = extract_first_object(trimmed) {
        if serde_json::from_str::<Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                return Some(text[json_start..json_start + end].trim().to_string());
            }
        }
    }

    None
}

/// Find the first balanced { ... } in the text, ignoring braces inside strings.
fn extract_first_object(text: &str) -> Option<String> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

fn parse_action(value: Option<&Value>) -> Result<Action, AgentError> {
    let raw = value
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::Parse("Missing field: action".to_string()))?;
    match raw.trim().to_ascii_uppercase().as_str() {
        "BUY" => Ok(Action::Buy),
        "SELL" => Ok(Action::Sell),
        "HOLD" => Ok(Action::Hold),
        other => Err(AgentError::Parse(format!("Unknown action: {other}"))),
    }
}

/// Accepts `"0.75"` as well as `0.75`.
fn parse_confidence(value: Option<&Value>) -> Result<Decimal, AgentError> {
    let confidence = match value {
        Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        Some(Value::Number(n)) => n.as_f64().and_then(Decimal::from_f64),
        _ => None,
    }
    .ok_or_else(|| AgentError::Parse("Missing or invalid field: confidence".to_string()))?;

    if confidence < Decimal::ZERO || confidence > Decimal::ONE {
        return Err(AgentError::Parse(format!(
            "confidence {confidence} outside [0, 1]"
        )));
    }
    Ok(confidence)
}

/// Build a `ResearchReport` for `task` from raw slave output.
///
/// Expected shape: `{"action", "confidence", "recommendations", "findings"}`.
/// Recommendations and findings are optional.
pub fn parse_research_output(
    raw: &str,
    task: &ResearchTask,
    agent_name: &str,
) -> Result<ResearchReport, AgentError> {
    let json_str = extract_json(raw)?;
    let value: Value = serde_json::from_str(&json_str)?;

    let action = parse_action(value.get("action"))?;
    let confidence = parse_confidence(value.get("confidence"))?;

    let recommendations = value
        .get("recommendations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let findings = value
        .get("findings")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(ResearchReport {
        task_id: task.id,
        specialty: task.specialty,
        symbol: task.symbol.clone(),
        agent_name: agent_name.to_string(),
        action,
        findings,
        recommendations,
        confidence,
        created_at: Utc::now(),
        elapsed_ms: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstrade_models::{PortfolioSnapshot, Specialty};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn task() -> ResearchTask {
        ResearchTask::new(
            Specialty::Technical,
            "BTC-USD",
            PortfolioSnapshot::with_cash(dec!(100000), Utc::now()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn extract_clean_json() {
        let input = r#"{"confidence": 0.75, "action": "BUY"}"#;
        assert_eq!(extract_json(input).unwrap(), input);
    }

    #[test]
    fn extract_from_markdown() {
        let input = "Here is my analysis:\n```json\n{\"confidence\": 0.75}\n```\nDone.";
        assert_eq!(extract_json(input).unwrap(), r#"{"confidence": 0.75}"#);
    }

    #[test]
    fn extract_with_prefix_text() {
        let input = "Based on the data:\n{\"action\": \"SELL\", \"confidence\": 0.6}";
        assert!(extract_json(input).unwrap().contains("SELL"));
    }

    #[test]
    fn extract_with_braces_in_strings() {
        let input = r#"{"findings": {"note": "range {low} to {high}"}, "confidence": 0.5}"#;
        let parsed: Value = serde_json::from_str(&extract_json(input).unwrap()).unwrap();
        assert_eq!(parsed["confidence"], 0.5);
    }

    #[test]
    fn extract_no_json() {
        assert!(extract_json("no json here").is_err());
        assert!(extract_json("} stray { brace").is_err());
    }

    #[test]
    fn parse_full_output() {
        let input = r#"```json
{
    "action": "buy",
    "confidence": "0.82",
    "recommendations": ["Scale in over two sessions", "Stop below 48k"],
    "findings": {"momentum": "positive", "rsi": 41.5}
}
```"#;
        let task = task();
        let report = parse_research_output(input, &task, "technical_llm").unwrap();
        assert_eq!(report.task_id, task.id);
        assert_eq!(report.specialty, Specialty::Technical);
        assert_eq!(report.symbol, "BTC-USD");
        assert_eq!(report.action, Action::Buy);
        assert_eq!(report.confidence, dec!(0.82));
        assert_eq!(report.recommendations.len(), 2);
        assert_eq!(report.findings["momentum"], "positive");
    }

    #[test]
    fn numeric_confidence_and_optional_fields() {
        let report =
            parse_research_output(r#"{"action": "HOLD", "confidence": 0.4}"#, &task(), "t").unwrap();
        assert_eq!(report.action, Action::Hold);
        assert_eq!(report.confidence, dec!(0.4));
        assert!(report.recommendations.is_empty());
        assert!(report.findings.is_empty());
    }

    #[test]
    fn out_of_range_confidence_rejected() {
        let err = parse_research_output(r#"{"action": "BUY", "confidence": 1.3}"#, &task(), "t")
            .unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
    }

    #[test]
    fn unknown_action_rejected() {
        let err = parse_research_output(r#"{"action": "SHORT", "confidence": 0.7}"#, &task(), "t")
            .unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
    }
}
