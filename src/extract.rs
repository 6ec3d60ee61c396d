//! JSON extraction from model text.
//!
//! The model is asked for a bare JSON array but routinely wraps it in prose
//! or code fences. Extraction takes the outermost `[...]` span if present,
//! else wraps the outermost `{...}` span in a single-element array, else
//! fails.

use crate::error::ScreenError;

/// Pull a JSON array string out of model text.
pub fn extract_json_array(text: &str) -> Result<String, ScreenError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    if let (Some(start), Some(end)) = (cleaned.find('['), cleaned.rfind(']')) {
        if start < end {
            return Ok(cleaned[start..=end].to_string());
        }
    }
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            return Ok(format!("[{}]", &cleaned[start..=end]));
        }
    }
    Err(ScreenError::MalformedResponse(
        "no JSON array or object in model text".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_passes_through() {
        let out = extract_json_array(r#"[{"id":1}]"#).unwrap();
        assert_eq!(out, r#"[{"id":1}]"#);
    }

    #[test]
    fn strips_code_fences() {
        let out = extract_json_array("```json\n[{\"id\":1}]\n```").unwrap();
        assert_eq!(out, r#"[{"id":1}]"#);
    }

    #[test]
    fn takes_outermost_array_inside_prose() {
        let out = extract_json_array("Here you go:\n[{\"id\":1},{\"id\":2}]\nHope that helps!")
            .unwrap();
        assert_eq!(out, r#"[{"id":1},{"id":2}]"#);
    }

    #[test]
    fn lone_object_is_wrapped() {
        let out = extract_json_array(r#"The result is {"id": 5, "risk_level": "High"} ok"#).unwrap();
        assert_eq!(out, r#"[{"id": 5, "risk_level": "High"}]"#);
    }

    #[test]
    fn array_preferred_over_object() {
        // An array containing objects must not be re-wrapped.
        let out = extract_json_array(r#"{"note":"x"} [{"id":1}]"#).unwrap();
        assert_eq!(out, r#"[{"id":1}]"#);
    }

    #[test]
    fn plain_prose_fails() {
        let err = extract_json_array("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, ScreenError::MalformedResponse(_)));
    }

    #[test]
    fn empty_input_fails() {
        assert!(extract_json_array("").is_err());
    }
}
