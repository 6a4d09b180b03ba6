use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, LedgerError, LedgerResult, MovementId, ProductId};

/// Direction of a movement. The magnitude itself is always positive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::In => "IN",
            MovementKind::Out => "OUT",
        }
    }

    /// +1 for IN, -1 for OUT.
    pub fn sign(self) -> i64 {
        match self {
            MovementKind::In => 1,
            MovementKind::Out => -1,
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementKind::In),
            "OUT" => Ok(MovementKind::Out),
            other => Err(LedgerError::validation(format!(
                "kind must be IN or OUT (got {other:?})"
            ))),
        }
    }
}

/// A committed ledger record. Never mutated or deleted individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub magnitude: i64,
    pub kind: MovementKind,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    pub fn from_draft(id: MovementId, draft: &MovementDraft, at: DateTime<Utc>) -> Self {
        Self {
            id,
            product_id: draft.product_id,
            magnitude: draft.magnitude,
            kind: draft.kind,
            note: draft.note.clone(),
            created_at: at,
        }
    }

    /// Contribution of this movement to the balance.
    pub fn signed_magnitude(&self) -> i64 {
        self.kind.sign() * self.magnitude
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Command: AppendMovement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendMovement {
    pub product_id: ProductId,
    pub magnitude: i64,
    pub kind: MovementKind,
    #[serde(default)]
    pub note: Option<String>,
}

impl AppendMovement {
    pub fn stock_in(product_id: ProductId, magnitude: i64) -> Self {
        Self {
            product_id,
            magnitude,
            kind: MovementKind::In,
            note: None,
        }
    }

    pub fn stock_out(product_id: ProductId, magnitude: i64) -> Self {
        Self {
            product_id,
            magnitude,
            kind: MovementKind::Out,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Reject non-positive magnitudes before anything touches the ledger.
    pub fn validate(&self) -> LedgerResult<MovementDraft> {
        if self.magnitude <= 0 {
            return Err(LedgerError::InvalidMagnitude(self.magnitude));
        }
        Ok(MovementDraft {
            product_id: self.product_id,
            magnitude: self.magnitude,
            kind: self.kind,
            note: self.note.clone(),
        })
    }
}

/// A validated movement awaiting append. `magnitude > 0` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    product_id: ProductId,
    magnitude: i64,
    kind: MovementKind,
    note: Option<String>,
}

impl MovementDraft {
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn magnitude(&self) -> i64 {
        self.magnitude
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn signed_magnitude(&self) -> i64 {
        self.kind.sign() * self.magnitude
    }
}

/// History display order: newest `created_at` first, ties by descending id.
pub fn newest_first(movements: &mut [Movement]) {
    movements.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_product_id() -> ProductId {
        ProductId::new(1)
    }

    #[test]
    fn zero_and_negative_magnitudes_are_rejected() {
        assert_eq!(
            AppendMovement::stock_in(test_product_id(), 0).validate(),
            Err(LedgerError::InvalidMagnitude(0))
        );
        assert_eq!(
            AppendMovement::stock_out(test_product_id(), -3).validate(),
            Err(LedgerError::InvalidMagnitude(-3))
        );
    }

    #[test]
    fn kind_uses_upper_case_wire_names() {
        assert_eq!(serde_json::to_string(&MovementKind::In).unwrap(), "\"IN\"");
        assert_eq!(
            serde_json::from_str::<MovementKind>("\"OUT\"").unwrap(),
            MovementKind::Out
        );
        assert!("out".parse::<MovementKind>().is_err());
    }

    #[test]
    fn signed_magnitude_follows_kind() {
        let draft = AppendMovement::stock_out(test_product_id(), 5)
            .with_note("Venda")
            .validate()
            .unwrap();
        assert_eq!(draft.signed_magnitude(), -5);
        assert_eq!(draft.note(), Some("Venda"));
    }

    #[test]
    fn newest_first_breaks_timestamp_ties_by_id() {
        let t0 = Utc::now();
        let draft = AppendMovement::stock_in(test_product_id(), 1).validate().unwrap();
        let mut movements = vec![
            Movement::from_draft(MovementId::new(1), &draft, t0),
            Movement::from_draft(MovementId::new(2), &draft, t0),
            Movement::from_draft(MovementId::new(3), &draft, t0 - Duration::seconds(1)),
            Movement::from_draft(MovementId::new(4), &draft, t0 + Duration::seconds(1)),
        ];

        newest_first(&mut movements);

        let ids: Vec<u64> = movements.iter().map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
    }
}
