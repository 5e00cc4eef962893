use serde::{Deserialize, Serialize};

/// Gem types in ascending point value. Emeralds come from logging an
/// attempt, sapphires from fulfilling a partner's request, rubies from
/// acknowledgments (both players), diamonds from scheduled bonuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "gem_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GemType {
    Emerald,
    Sapphire,
    Ruby,
    Diamond,
}

impl GemType {
    /// Fixed point value of one gem of this type.
    pub fn value(self) -> i64 {
        match self {
            GemType::Emerald => 1,
            GemType::Sapphire => 2,
            GemType::Ruby => 3,
            GemType::Diamond => 5,
        }
    }

    /// Gem awarded for logging an attempt. The award value always
    /// equals the stored type's table value; there is no separate
    /// fulfillment bonus on top of it.
    pub fn for_attempt(fulfilled_request: bool) -> Self {
        if fulfilled_request {
            GemType::Sapphire
        } else {
            GemType::Emerald
        }
    }
}

/// Lifecycle state of an attempt's gem. New attempts are solid; an
/// acknowledgment turns them liquid; the daily job turns stale solid
/// gems to coal. Transitions are one-way and mutually exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "gem_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GemState {
    Solid,
    Liquid,
    Coal,
}

/// Per-type gem counts for a player, either lifetime or liquid-only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GemBreakdown {
    pub emerald: i64,
    pub sapphire: i64,
    pub ruby: i64,
    pub diamond: i64,
}

impl GemBreakdown {
    /// Aggregate point value of the breakdown. Consumers use this both
    /// for live totals and for proportional cup fill layers.
    pub fn total_value(&self) -> i64 {
        self.emerald * GemType::Emerald.value()
            + self.sapphire * GemType::Sapphire.value()
            + self.ruby * GemType::Ruby.value()
            + self.diamond * GemType::Diamond.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gem_values_match_table() {
        assert_eq!(GemType::Emerald.value(), 1);
        assert_eq!(GemType::Sapphire.value(), 2);
        assert_eq!(GemType::Ruby.value(), 3);
        assert_eq!(GemType::Diamond.value(), 5);
    }

    #[test]
    fn empty_breakdown_has_zero_value() {
        assert_eq!(GemBreakdown::default().total_value(), 0);
    }

    #[test]
    fn unmatched_attempt_earns_one_point_emerald() {
        let gem = GemType::for_attempt(false);
        assert_eq!(gem, GemType::Emerald);
        assert_eq!(gem.value(), 1);
    }

    #[test]
    fn matched_attempt_earns_two_point_sapphire() {
        let gem = GemType::for_attempt(true);
        assert_eq!(gem, GemType::Sapphire);
        assert_eq!(gem.value(), 2);
    }

    #[test]
    fn acknowledgment_distributes_six_points() {
        // One ruby to each player.
        assert_eq!(GemType::Ruby.value() * 2, 6);
    }

    #[test]
    fn total_value_sums_weighted_counts() {
        let b = GemBreakdown {
            emerald: 4,
            sapphire: 3,
            ruby: 2,
            diamond: 1,
        };
        // 4*1 + 3*2 + 2*3 + 1*5
        assert_eq!(b.total_value(), 21);
    }
}
