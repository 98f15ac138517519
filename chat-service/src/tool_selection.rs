//! Per-turn narrowing of the tool set from the user's own words.

use crate::tools::BuiltinTool;

/// Restricts the turn to `query_database`.
pub const QUERY_MARKER: &str = "@query";
/// Restricts the turn to `get_information`.
pub const FIND_MARKER: &str = "@find";

/// Tools the model may call this turn.
///
/// Markers are matched case-insensitively anywhere in the utterance and
/// checked in order; the first match wins. Without a marker every
/// registered tool stays active.
pub fn select_active_tools(utterance: &str, registered: &[BuiltinTool]) -> Vec<BuiltinTool> {
    let lowered = utterance.to_lowercase();

    let restriction = if lowered.contains(QUERY_MARKER) {
        Some(BuiltinTool::QueryDatabase)
    } else if lowered.contains(FIND_MARKER) {
        Some(BuiltinTool::GetInformation)
    } else {
        None
    };

    match restriction {
        Some(only) => vec![only],
        None => registered.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_marker_keeps_everything() {
        let active = select_active_tools("What's the weather in Paris?", &BuiltinTool::ALL);
        assert_eq!(active, BuiltinTool::ALL.to_vec());
    }

    #[test]
    fn query_marker_is_case_insensitive() {
        let active = select_active_tools("@QUERY What is Vercel's valuation?", &BuiltinTool::ALL);
        assert_eq!(active, vec![BuiltinTool::QueryDatabase]);
    }

    #[test]
    fn find_marker_selects_retrieval() {
        let active = select_active_tools("refund policy @Find", &BuiltinTool::ALL);
        assert_eq!(active, vec![BuiltinTool::GetInformation]);
    }

    #[test]
    fn query_marker_wins_over_find() {
        let active = select_active_tools("@find or @query?", &BuiltinTool::ALL);
        assert_eq!(active, vec![BuiltinTool::QueryDatabase]);
    }

    #[test]
    fn near_misses_do_not_match() {
        let active = select_active_tools("query the data, then find it", &BuiltinTool::ALL);
        assert_eq!(active.len(), BuiltinTool::ALL.len());
    }
}
