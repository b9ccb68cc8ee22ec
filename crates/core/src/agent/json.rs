//! JSON extraction from free-text agent transcripts.
//!
//! Agents wrap their structured answer in prose or code fences. The rule is
//! simple and deterministic: the first `{` that starts a well-formed JSON
//! object wins, and that object must match the expected type.

use super::AgentOutput;
use crate::error::AgentError;
use serde_json::{Map, Value};

/// Find the first well-formed JSON object in `text`
pub fn extract_first_json_object(text: &str) -> Option<Map<String, Value>> {
    for (index, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[index..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            return Some(map);
        }
    }
    None
}

/// Extract, deserialize and validate an agent result
pub fn parse_agent_output<T: AgentOutput>(text: &str) -> Result<T, AgentError> {
    let object = extract_first_json_object(text)
        .ok_or_else(|| AgentError::malformed("no JSON object found in agent output", text))?;

    let parsed: T = serde_json::from_value(Value::Object(object)).map_err(|e| {
        AgentError::malformed(format!("JSON does not match the expected shape: {}", e), text)
    })?;

    parsed
        .validate()
        .map_err(|reason| AgentError::malformed(reason, text))?;

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Summary {
        summary: String,
        #[serde(default)]
        files: Vec<String>,
    }

    impl AgentOutput for Summary {}

    #[test]
    fn test_extracts_object_from_prose() {
        let text = "I looked at the code.\n```json\n{\"summary\": \"ok\", \"files\": [\"a.rs\"]}\n```\nBye";
        let parsed: Summary = parse_agent_output(text).unwrap();
        assert_eq!(parsed.summary, "ok");
        assert_eq!(parsed.files, vec!["a.rs"]);
    }

    #[test]
    fn test_skips_braces_that_are_not_json() {
        let text = "fn main() { println!(\"hi\"); }\n{\"summary\": \"after code\"}";
        let parsed: Summary = parse_agent_output(text).unwrap();
        assert_eq!(parsed.summary, "after code");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"summary": "use {} in format strings"}"#;
        let parsed: Summary = parse_agent_output(text).unwrap();
        assert_eq!(parsed.summary, "use {} in format strings");
    }

    #[test]
    fn test_first_object_wins() {
        let text = r#"{"summary": "first"} {"summary": "second"}"#;
        let parsed: Summary = parse_agent_output(text).unwrap();
        assert_eq!(parsed.summary, "first");
    }

    #[test]
    fn test_no_json_is_malformed() {
        let err = parse_agent_output::<Summary>("I could not finish the plan.").unwrap_err();
        match err {
            AgentError::MalformedOutput { reason, excerpt } => {
                assert!(reason.contains("no JSON object"));
                assert!(excerpt.starts_with("I could not"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let err = parse_agent_output::<Summary>(r#"{"files": []}"#).unwrap_err();
        assert!(err.to_string().contains("expected shape"));
    }

    #[test]
    fn test_parsing_is_idempotent() {
        let text = "Result:\n{\"summary\": \"stable\", \"files\": [\"x.rs\", \"y.rs\"]}";
        let first: Summary = parse_agent_output(text).unwrap();
        let second: Summary = parse_agent_output(text).unwrap();
        assert_eq!(first, second);
        assert_eq!(extract_first_json_object(text), extract_first_json_object(text));
    }
}
