use uuid::Uuid;

/// An active request addressed to the acting player, as loaded from
/// the store in creation order.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub id: Uuid,
    pub action: String,
}

/// Trim and lowercase an action string for comparison. Matching is
/// exact post-normalization, not fuzzy; players are expected to reuse
/// the suggested phrasing verbatim.
pub fn normalize(action: &str) -> String {
    action.trim().to_lowercase()
}

/// Find the first open request whose normalized action equals the
/// given (already normalized) action. Read-only; fulfillment is
/// applied by the caller. Keeping the matching rule behind this seam
/// lets it be swapped for fuzzy or id-based matching later without
/// touching the attempt logger.
pub fn find_match<'a>(normalized_action: &str, open: &'a [OpenRequest]) -> Option<&'a OpenRequest> {
    open.iter()
        .find(|req| normalize(&req.action) == normalized_action)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(action: &str) -> OpenRequest {
        OpenRequest {
            id: Uuid::new_v4(),
            action: action.to_string(),
        }
    }

    #[test]
    fn matches_case_insensitively() {
        let open = vec![req("Make Coffee")];
        let found = find_match(&normalize("  make coffee "), &open);
        assert_eq!(found.map(|r| r.id), Some(open[0].id));
    }

    #[test]
    fn no_match_for_different_action() {
        let open = vec![req("make coffee")];
        assert!(find_match(&normalize("make tea"), &open).is_none());
    }

    #[test]
    fn punctuation_variants_do_not_match() {
        // Documented fragility: only exact text (modulo case and
        // surrounding whitespace) matches.
        let open = vec![req("make coffee!")];
        assert!(find_match(&normalize("make coffee"), &open).is_none());
    }

    #[test]
    fn first_request_in_creation_order_wins() {
        let open = vec![req("walk the dog"), req("Walk The Dog")];
        let found = find_match(&normalize("walk the dog"), &open).unwrap();
        assert_eq!(found.id, open[0].id);
    }
}
