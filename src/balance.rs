use crate::money::Money;
use crate::schemas::{Expense, ExpenseId, ExpenseParticipantShare, Payment, UserId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

/// An unordered pair of users, stored with `user1 < user2`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct UserPair {
    pub user1: UserId,
    pub user2: UserId,
}

impl UserPair {
    /// Orders the two users. The flag is set when "`debtor` owes `creditor`"
    /// has to be negated to match the pair's orientation.
    fn oriented(debtor: &str, creditor: &str) -> (UserPair, bool) {
        if debtor < creditor {
            (
                UserPair {
                    user1: debtor.to_string(),
                    user2: creditor.to_string(),
                },
                false,
            )
        } else {
            (
                UserPair {
                    user1: creditor.to_string(),
                    user2: debtor.to_string(),
                },
                true,
            )
        }
    }
}

/// Something in the stored ledger that does not look like a complete,
/// consistent expense.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerAnomaly {
    OrphanedShare {
        expense_id: ExpenseId,
        user_id: UserId,
    },
    ExpenseWithoutShares {
        expense_id: ExpenseId,
    },
    ShareSumMismatch {
        expense_id: ExpenseId,
        expected: Money,
        actual: Money,
    },
    DuplicateShare {
        expense_id: ExpenseId,
        user_id: UserId,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    pub total_owed_to_user: Money,
    pub total_user_owes: Money,
    pub net: Money,
}

/// Signed balance between a user and one counterpart. Positive means the
/// counterpart owes the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CounterpartBalance {
    pub user_id: UserId,
    pub balance: Money,
}

/// Net amounts owed between pairs of users. A missing pair means neither
/// owes the other anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PairBalances {
    balances: BTreeMap<UserPair, Money>,
    anomalies: Vec<LedgerAnomaly>,
}

impl PairBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `debtor` owes `creditor` an additional `amount`.
    pub fn add_debt(&mut self, debtor: &str, creditor: &str, amount: Money) {
        if debtor == creditor || amount.is_zero() {
            return;
        }
        let (pair, flipped) = UserPair::oriented(debtor, creditor);
        let amount = if flipped { -amount } else { amount };
        let current = self.balances.get(&pair).copied().unwrap_or(Money::ZERO);
        let updated = current + amount;
        if updated.is_zero() {
            self.balances.remove(&pair);
        } else {
            self.balances.insert(pair, updated);
        }
    }

    /// How much `debtor` owes `creditor`; negative when it is the other way round.
    #[cfg(test)]
    pub fn owed(&self, debtor: &str, creditor: &str) -> Money {
        if debtor == creditor {
            return Money::ZERO;
        }
        let (pair, flipped) = UserPair::oriented(debtor, creditor);
        let amount = self.balances.get(&pair).copied().unwrap_or(Money::ZERO);
        if flipped {
            -amount
        } else {
            amount
        }
    }

    /// Pairs with a nonzero balance; positive values mean `user1` owes `user2`.
    pub fn iter(&self) -> impl Iterator<Item = (&UserPair, Money)> {
        self.balances.iter().map(|(pair, amount)| (pair, *amount))
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn anomalies(&self) -> &[LedgerAnomaly] {
        &self.anomalies
    }

    /// Settles recorded payments against the balances: a payment from A to B
    /// reduces what A owes B.
    pub fn apply_payments<'a>(&mut self, payments: impl IntoIterator<Item = &'a Payment>) {
        for payment in payments {
            self.add_debt(&payment.to, &payment.from, payment.amount);
        }
    }

    pub fn counterparties(&self, user: &str) -> Vec<CounterpartBalance> {
        let mut counterparts = self
            .balances
            .iter()
            .filter_map(|(pair, amount)| {
                if pair.user1 == user {
                    Some(CounterpartBalance {
                        user_id: pair.user2.clone(),
                        balance: -*amount,
                    })
                } else if pair.user2 == user {
                    Some(CounterpartBalance {
                        user_id: pair.user1.clone(),
                        balance: *amount,
                    })
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();
        counterparts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        counterparts
    }

    pub fn summary_for(&self, user: &str) -> BalanceSummary {
        let mut summary = BalanceSummary::default();
        for counterpart in self.counterparties(user) {
            if counterpart.balance.is_positive() {
                summary.total_owed_to_user += counterpart.balance;
            } else {
                summary.total_user_owes -= counterpart.balance;
            }
        }
        summary.net = summary.total_owed_to_user - summary.total_user_owes;
        summary
    }
}

/// Folds every share into pairwise debts towards the expense creator.
///
/// The creator is assumed to have paid the whole amount, so each other
/// participant owes the creator their share. Debts in both directions
/// between the same two users are netted into one signed amount.
pub fn aggregate_balances(
    shares: &[ExpenseParticipantShare],
    expenses: &HashMap<ExpenseId, Expense>,
) -> PairBalances {
    let mut balances = PairBalances::new();
    let mut anomalies = BTreeSet::new();
    let mut totals: HashMap<&ExpenseId, Money> = HashMap::new();
    let mut seen: BTreeSet<(&ExpenseId, &UserId)> = BTreeSet::new();

    for share in shares {
        let Some(expense) = expenses.get(&share.expense_id) else {
            anomalies.insert(LedgerAnomaly::OrphanedShare {
                expense_id: share.expense_id.clone(),
                user_id: share.user_id.clone(),
            });
            continue;
        };
        if !seen.insert((&share.expense_id, &share.user_id)) {
            anomalies.insert(LedgerAnomaly::DuplicateShare {
                expense_id: share.expense_id.clone(),
                user_id: share.user_id.clone(),
            });
        }
        *totals.entry(&share.expense_id).or_insert(Money::ZERO) += share.amount;
        balances.add_debt(&share.user_id, &expense.created_by, share.amount);
    }

    for (id, expense) in expenses {
        match totals.get(id) {
            None => {
                anomalies.insert(LedgerAnomaly::ExpenseWithoutShares {
                    expense_id: id.clone(),
                });
            }
            Some(actual) if (*actual - expense.amount).abs() > Money::MINOR_UNIT => {
                anomalies.insert(LedgerAnomaly::ShareSumMismatch {
                    expense_id: id.clone(),
                    expected: expense.amount,
                    actual: *actual,
                });
            }
            Some(_) => {}
        }
    }

    for anomaly in &anomalies {
        warn!(?anomaly, "inconsistent ledger record");
    }
    balances.anomalies = anomalies.into_iter().collect();
    balances
}
