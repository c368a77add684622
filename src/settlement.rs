use crate::balance::PairBalances;
use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;
use crate::schemas::UserId;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettlementInstruction {
    pub from: UserId,
    pub to: UserId,
    pub amount: Money,
}

pub type NetPositions = BTreeMap<UserId, Money>;

/// Owed-to-them minus owed-by-them for every user with a nonzero position.
pub fn net_positions(balances: &PairBalances) -> NetPositions {
    let mut positions = NetPositions::new();
    for (pair, amount) in balances.iter() {
        *positions.entry(pair.user1.clone()).or_insert(Money::ZERO) -= amount;
        *positions.entry(pair.user2.clone()).or_insert(Money::ZERO) += amount;
    }
    positions.retain(|_, position| !position.is_zero());
    positions
}

// One payment per pair, i.e. what happens if no simplification is done
fn naive_instructions(balances: &PairBalances) -> Vec<SettlementInstruction> {
    balances
        .iter()
        .map(|(pair, amount)| {
            let (from, to) = if amount.is_negative() {
                (&pair.user2, &pair.user1)
            } else {
                (&pair.user1, &pair.user2)
            };
            SettlementInstruction {
                from: from.clone(),
                to: to.clone(),
                amount: amount.abs(),
            }
        })
        .collect()
}

/// Greedy debt simplification over raw net positions.
///
/// The largest debtor always pays the largest creditor; equal magnitudes
/// are ordered by ascending user id. Fails if credits and debits do not
/// cancel out.
pub fn plan_from_positions(positions: &NetPositions) -> LedgerResult<Vec<SettlementInstruction>> {
    let total: Money = positions.values().sum();
    if !total.is_zero() {
        return Err(LedgerError::integrity(format!(
            "credits and debits differ by {total}"
        )));
    }

    // Sorted so the first element is the largest magnitude, then the lowest id.
    let mut debtors: BTreeSet<(Reverse<Money>, UserId)> = BTreeSet::new();
    let mut creditors: BTreeSet<(Reverse<Money>, UserId)> = BTreeSet::new();
    for (user, position) in positions {
        if position.is_negative() {
            debtors.insert((Reverse(position.abs()), user.clone()));
        } else if position.is_positive() {
            creditors.insert((Reverse(*position), user.clone()));
        }
    }

    let mut instructions = Vec::new();
    while let (Some((Reverse(owes), debtor)), Some((Reverse(due), creditor))) =
        (debtors.pop_first(), creditors.pop_first())
    {
        let amount = owes.min(due);
        if owes > amount {
            debtors.insert((Reverse(owes - amount), debtor.clone()));
        }
        if due > amount {
            creditors.insert((Reverse(due - amount), creditor.clone()));
        }
        instructions.push(SettlementInstruction {
            from: debtor,
            to: creditor,
            amount,
        });
    }
    Ok(instructions)
}

/// Suggests the payments that settle every balance in `balances`.
pub fn plan_settlements(balances: &PairBalances) -> LedgerResult<Vec<SettlementInstruction>> {
    if balances.is_empty() {
        return Ok(Vec::new());
    }
    let positions = net_positions(balances);
    let simplified = plan_from_positions(&positions)?;
    let naive = naive_instructions(balances);
    debug!(
        users = positions.len(),
        simplified = simplified.len(),
        naive = naive.len(),
        "planned settlements"
    );

    // We ensure the simplification didn't accidentally end up being
    // more complicated than the naive exchanges
    if naive.len() < simplified.len() {
        Ok(naive)
    } else {
        Ok(simplified)
    }
}
