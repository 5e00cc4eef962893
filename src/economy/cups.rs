/// Cup gauges run 0-99 and wrap past 100. Both the individual and the
/// collective cup use the same wraparound rule, so overflow is a
/// repeatable event rather than a one-time ceiling.
///
/// Single-wraparound assumption: the points added per advance are
/// always < 100 (ack points default 5, collective award 3), so at most
/// one overflow can occur per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CupAdvance {
    pub level: i32,
    pub overflow: bool,
}

pub fn advance_cup(current: i32, points: i32) -> CupAdvance {
    let raw = current + points;
    if raw >= 100 {
        CupAdvance {
            level: raw - 100,
            overflow: true,
        }
    } else {
        CupAdvance {
            level: raw,
            overflow: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_below_threshold_does_not_overflow() {
        let adv = advance_cup(50, 5);
        assert_eq!(adv.level, 55);
        assert!(!adv.overflow);
    }

    #[test]
    fn advance_crossing_100_wraps() {
        let adv = advance_cup(97, 5);
        assert_eq!(adv.level, 2);
        assert!(adv.overflow);
    }

    #[test]
    fn landing_exactly_on_100_wraps_to_zero() {
        let adv = advance_cup(95, 5);
        assert_eq!(adv.level, 0);
        assert!(adv.overflow);
    }

    #[test]
    fn collective_award_wraps_like_individual() {
        let adv = advance_cup(98, 3);
        assert_eq!(adv.level, 1);
        assert!(adv.overflow);
    }
}
