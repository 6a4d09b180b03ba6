//! Balance derivation.
//!
//! The balance of a product is a pure fold over its movement log:
//! `Σ magnitude(IN) − Σ magnitude(OUT)`. No counter is authoritative; any cached
//! total must agree with this fold.

use serde::{Deserialize, Serialize};

use stockledger_core::{LedgerError, LedgerResult, ProductId};

use crate::movement::{Movement, MovementDraft, MovementKind};

/// Fold a movement history into its balance.
///
/// Order does not matter. Arithmetic is checked; an overflow reports `Internal`
/// rather than wrapping.
pub fn derive_balance<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> LedgerResult<i64> {
    movements.into_iter().try_fold(0i64, |acc, m| {
        acc.checked_add(m.signed_magnitude())
            .ok_or_else(|| LedgerError::internal(format!("balance overflow at movement {}", m.id)))
    })
}

/// Guard a withdrawal against the current balance.
///
/// IN movements always pass. An OUT equal to the balance passes (leaves 0).
pub fn check_withdrawal(balance: i64, draft: &MovementDraft) -> LedgerResult<()> {
    if draft.kind() == MovementKind::Out && draft.magnitude() > balance {
        return Err(LedgerError::InsufficientStock {
            requested: draft.magnitude(),
            available: balance,
        });
    }
    Ok(())
}

/// Balance once `draft` is appended, after passing [`check_withdrawal`].
pub fn balance_after(balance: i64, draft: &MovementDraft) -> LedgerResult<i64> {
    check_withdrawal(balance, draft)?;
    balance
        .checked_add(draft.signed_magnitude())
        .ok_or_else(|| LedgerError::internal("balance overflow"))
}

/// Result of reconciling a cached running total against the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAudit {
    pub product_id: ProductId,
    /// Balance folded from the full movement log (authoritative).
    pub derived: i64,
    /// Running total kept by the store, when it keeps one.
    pub cached: Option<i64>,
    pub consistent: bool,
}

impl BalanceAudit {
    pub fn new(product_id: ProductId, derived: i64, cached: Option<i64>) -> Self {
        Self {
            product_id,
            derived,
            cached,
            consistent: cached.is_none_or(|c| c == derived),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::AppendMovement;
    use chrono::Utc;
    use proptest::prelude::*;
    use stockledger_core::MovementId;

    fn test_product_id() -> ProductId {
        ProductId::new(1)
    }

    fn history(ops: &[(MovementKind, i64)]) -> Vec<Movement> {
        let now = Utc::now();
        ops.iter()
            .enumerate()
            .map(|(i, (kind, magnitude))| {
                let draft = AppendMovement {
                    product_id: test_product_id(),
                    magnitude: *magnitude,
                    kind: *kind,
                    note: None,
                }
                .validate()
                .unwrap();
                Movement::from_draft(MovementId::new(i as u64 + 1), &draft, now)
            })
            .collect()
    }

    #[test]
    fn empty_history_has_zero_balance() {
        assert_eq!(derive_balance(&Vec::<Movement>::new()), Ok(0));
    }

    #[test]
    fn fold_subtracts_out_from_in() {
        let h = history(&[
            (MovementKind::In, 50),
            (MovementKind::Out, 5),
            (MovementKind::Out, 40),
        ]);
        assert_eq!(derive_balance(&h), Ok(5));
    }

    #[test]
    fn withdrawal_of_exact_balance_is_allowed() {
        let draft = AppendMovement::stock_out(test_product_id(), 5).validate().unwrap();
        assert_eq!(balance_after(5, &draft), Ok(0));
    }

    #[test]
    fn withdrawal_one_past_balance_is_rejected() {
        let draft = AppendMovement::stock_out(test_product_id(), 6).validate().unwrap();
        assert_eq!(
            check_withdrawal(5, &draft),
            Err(LedgerError::InsufficientStock {
                requested: 6,
                available: 5
            })
        );
    }

    #[test]
    fn deposits_never_hit_the_guard() {
        let draft = AppendMovement::stock_in(test_product_id(), 1_000).validate().unwrap();
        assert_eq!(check_withdrawal(0, &draft), Ok(()));
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        let h = history(&[(MovementKind::In, i64::MAX), (MovementKind::In, 1)]);
        assert!(matches!(derive_balance(&h), Err(LedgerError::Internal(_))));
    }

    #[test]
    fn audit_flags_divergent_cache() {
        assert!(BalanceAudit::new(test_product_id(), 5, Some(5)).consistent);
        assert!(BalanceAudit::new(test_product_id(), 5, None).consistent);
        assert!(!BalanceAudit::new(test_product_id(), 5, Some(6)).consistent);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: applying only guarded movements keeps the running balance
        /// non-negative, and the fold over the accepted log equals that running
        /// balance (twice in a row, no hidden state).
        #[test]
        fn guarded_log_never_goes_negative(
            ops in prop::collection::vec((any::<bool>(), 1i64..1_000), 0..64)
        ) {
            let mut balance = 0i64;
            let mut accepted = Vec::new();
            for (is_in, magnitude) in ops {
                let kind = if is_in { MovementKind::In } else { MovementKind::Out };
                let draft = AppendMovement { product_id: test_product_id(), magnitude, kind, note: None }
                    .validate()
                    .unwrap();
                if let Ok(next) = balance_after(balance, &draft) {
                    balance = next;
                    accepted.push((kind, magnitude));
                }
                prop_assert!(balance >= 0);
            }

            let log = history(&accepted);
            prop_assert_eq!(derive_balance(&log), Ok(balance));
            prop_assert_eq!(derive_balance(&log), derive_balance(&log));
        }

        /// Property: IN m followed by OUT m restores the prior balance.
        #[test]
        fn deposit_then_withdrawal_round_trips(start in 0i64..10_000, m in 1i64..10_000) {
            let deposit = AppendMovement::stock_in(test_product_id(), m).validate().unwrap();
            let withdrawal = AppendMovement::stock_out(test_product_id(), m).validate().unwrap();
            let mid = balance_after(start, &deposit).unwrap();
            prop_assert_eq!(balance_after(mid, &withdrawal), Ok(start));
        }
    }
}
