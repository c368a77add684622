use crate::error::{LedgerError, LedgerResult};
use crate::money::Money;
use crate::schemas::{SplitMode, UserId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type Shares = BTreeMap<UserId, Money>;

/// Custom splits may miss the total by at most this much.
pub const CUSTOM_SPLIT_TOLERANCE: Money = Money::MINOR_UNIT;

/// Divides `amount` among `participants` according to `mode`.
///
/// Equal splits hand the leftover cents out one each in ascending user id
/// order, so the shares always add up to `amount` exactly. Custom splits
/// return the supplied amounts as they are (missing participants owe 0)
/// once their sum is within [`CUSTOM_SPLIT_TOLERANCE`] of `amount`.
pub fn compute_shares(
    amount: Money,
    mode: SplitMode,
    participants: &[UserId],
    custom_amounts: Option<&HashMap<UserId, Money>>,
) -> LedgerResult<Shares> {
    if !amount.is_positive() {
        return Err(LedgerError::validation(format!(
            "amount must be greater than 0, got {amount}"
        )));
    }
    if amount > Money::MAX {
        return Err(LedgerError::validation(format!(
            "amount must not exceed {}, got {amount}",
            Money::MAX
        )));
    }
    let participants = unique_participants(participants)?;

    match mode {
        SplitMode::Equal => Ok(equal_shares(amount, &participants)),
        SplitMode::Custom => custom_shares(amount, &participants, custom_amounts),
    }
}

fn unique_participants(participants: &[UserId]) -> LedgerResult<BTreeSet<&UserId>> {
    if participants.is_empty() {
        return Err(LedgerError::validation("select at least one participant"));
    }
    let mut unique = BTreeSet::new();
    for participant in participants {
        if !unique.insert(participant) {
            return Err(LedgerError::validation(format!(
                "participant `{participant}` is listed more than once"
            )));
        }
    }
    Ok(unique)
}

fn equal_shares(amount: Money, participants: &BTreeSet<&UserId>) -> Shares {
    let count = participants.len() as i64;
    let base = amount.minor() / count;
    let remainder = (amount.minor() % count) as usize;

    participants
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let extra = if index < remainder { 1 } else { 0 };
            ((*id).clone(), Money::from_minor(base + extra))
        })
        .collect()
}

fn custom_shares(
    amount: Money,
    participants: &BTreeSet<&UserId>,
    custom_amounts: Option<&HashMap<UserId, Money>>,
) -> LedgerResult<Shares> {
    let mut shares = Shares::new();
    for id in participants {
        let share = custom_amounts
            .and_then(|amounts| amounts.get(*id))
            .copied()
            .unwrap_or(Money::ZERO);
        if share.is_negative() {
            return Err(LedgerError::validation(format!(
                "custom amount for `{id}` must not be negative, got {share}"
            )));
        }
        if share > Money::MAX {
            return Err(LedgerError::validation(format!(
                "custom amount for `{id}` must not exceed {}, got {share}",
                Money::MAX
            )));
        }
        shares.insert((*id).clone(), share);
    }

    let total = shares
        .values()
        .try_fold(Money::ZERO, |total, share| total.checked_add(*share))
        .ok_or_else(|| LedgerError::validation("custom amounts overflow"))?;
    if (total - amount).abs() > CUSTOM_SPLIT_TOLERANCE {
        return Err(LedgerError::validation(format!(
            "custom amounts must sum to the total amount ({total} != {amount})"
        )));
    }
    Ok(shares)
}
