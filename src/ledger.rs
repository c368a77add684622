use crate::balance::{
    aggregate_balances, BalanceSummary, CounterpartBalance, LedgerAnomaly, PairBalances,
};
use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{
    Expense, ExpenseFilter, ExpenseId, ExpenseParticipantShare, ExpenseRequest, ExpenseWithShares,
    NewExpense, NewPayment, NewShare, Payment, PaymentRequest, UserId,
};
use crate::settlement::{plan_settlements, SettlementInstruction};
use crate::split::{compute_shares, Shares};
use crate::store::ExpenseStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserBalances {
    pub user_id: UserId,
    pub summary: BalanceSummary,
    pub counterparts: Vec<CounterpartBalance>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SettlementPlan {
    pub instructions: Vec<SettlementInstruction>,
    pub anomalies: Vec<LedgerAnomaly>,
}

/// Everything the engine needs, fetched in one go from the store.
struct Snapshot {
    expenses: HashMap<ExpenseId, Expense>,
    shares: Vec<ExpenseParticipantShare>,
    payments: Vec<Payment>,
}

impl Snapshot {
    async fn load(store: &dyn ExpenseStore, user: Option<&UserId>) -> LedgerResult<Self> {
        let mut expenses: HashMap<ExpenseId, Expense> = store
            .list_expenses(user)
            .await?
            .into_iter()
            .map(|expense| (expense.id.clone(), expense))
            .collect();
        let mut shares = Vec::new();
        for (expense, share) in store.list_expense_shares(user).await? {
            expenses.entry(expense.id.clone()).or_insert(expense);
            shares.push(share);
        }
        let payments = store.list_payments(user).await?;
        Ok(Self {
            expenses,
            shares,
            payments,
        })
    }

    fn balances(&self) -> PairBalances {
        let mut balances = aggregate_balances(&self.shares, &self.expenses);
        balances.apply_payments(&self.payments);
        balances
    }
}

pub fn preview_split(request: &ExpenseRequest) -> LedgerResult<Shares> {
    compute_shares(
        request.amount,
        request.split_mode,
        &request.participants,
        request.custom_amounts.as_ref(),
    )
}

#[instrument(skip(store, request), fields(amount = %request.amount))]
pub async fn create_expense(
    store: &dyn ExpenseStore,
    creator: &UserId,
    request: ExpenseRequest,
) -> LedgerResult<ExpenseWithShares> {
    let description = request.description.trim();
    if description.is_empty() {
        return Err(LedgerError::validation("description is required"));
    }
    let shares = preview_split(&request)?;

    let expense = NewExpense {
        description: description.to_string(),
        amount: request.amount,
        split_mode: request.split_mode,
        created_by: creator.clone(),
        created_at: Utc::now(),
    };
    let new_shares = shares
        .iter()
        .map(|(user_id, amount)| NewShare {
            user_id: user_id.clone(),
            amount: *amount,
        })
        .collect();
    let expense = store.create_expense_with_shares(expense, new_shares).await?;
    info!(expense_id = %expense.id, participants = shares.len(), "expense created");

    let shares = shares
        .into_iter()
        .map(|(user_id, amount)| ExpenseParticipantShare {
            expense_id: expense.id.clone(),
            user_id,
            amount,
        })
        .collect();
    Ok(ExpenseWithShares { expense, shares })
}

#[instrument(skip(store, request), fields(to = %request.to, amount = %request.amount))]
pub async fn record_payment(
    store: &dyn ExpenseStore,
    from: &UserId,
    request: PaymentRequest,
) -> LedgerResult<Payment> {
    if !request.amount.is_positive() {
        return Err(LedgerError::validation(format!(
            "payment amount must be greater than 0, got {}",
            request.amount
        )));
    }
    if &request.to == from {
        return Err(LedgerError::validation("cannot pay yourself"));
    }
    let payment = store
        .record_payment(NewPayment {
            from: from.clone(),
            to: request.to,
            amount: request.amount,
            created_at: Utc::now(),
        })
        .await?;
    info!(payment_id = %payment.id, "payment recorded");
    Ok(payment)
}

/// The user's balance with everyone they share expenses or payments with.
pub async fn balances_for(store: &dyn ExpenseStore, user: &UserId) -> LedgerResult<UserBalances> {
    let balances = Snapshot::load(store, Some(user)).await?.balances();
    Ok(UserBalances {
        user_id: user.clone(),
        summary: balances.summary_for(user),
        counterparts: balances.counterparties(user),
    })
}

/// Suggested payments that settle the whole ledger.
pub async fn settlement_plan(store: &dyn ExpenseStore) -> LedgerResult<SettlementPlan> {
    let balances = Snapshot::load(store, None).await?.balances();
    let instructions = plan_settlements(&balances)?;
    Ok(SettlementPlan {
        instructions,
        anomalies: balances.anomalies().to_vec(),
    })
}

fn matches_filter(expense: &Expense, filter: &ExpenseFilter) -> bool {
    let day = expense.created_at.date_naive();
    if filter.from.is_some_and(|from| day < from) || filter.to.is_some_and(|to| day > to) {
        return false;
    }
    match filter.search.as_deref().map(str::trim) {
        Some(needle) if !needle.is_empty() => {
            let needle = needle.to_lowercase();
            expense.description.to_lowercase().contains(&needle)
        }
        _ => true,
    }
}

/// The user's expenses with all of their shares, newest first, narrowed by
/// `filter`.
pub async fn expenses_for(
    store: &dyn ExpenseStore,
    user: &UserId,
    filter: &ExpenseFilter,
) -> LedgerResult<Vec<ExpenseWithShares>> {
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(LedgerError::validation(format!(
                "`from` ({from}) is after `to` ({to})"
            )));
        }
    }
    let snapshot = Snapshot::load(store, Some(user)).await?;
    let mut by_expense: HashMap<ExpenseId, Vec<ExpenseParticipantShare>> = HashMap::new();
    for share in snapshot.shares {
        by_expense
            .entry(share.expense_id.clone())
            .or_default()
            .push(share);
    }

    let mut expenses: Vec<ExpenseWithShares> = snapshot
        .expenses
        .into_values()
        .filter(|expense| matches_filter(expense, filter))
        .map(|expense| {
            let mut shares = by_expense.remove(&expense.id).unwrap_or_default();
            shares.sort_by(|a, b| a.user_id.cmp(&b.user_id));
            ExpenseWithShares { expense, shares }
        })
        .collect();
    expenses.sort_by(|a, b| {
        b.expense
            .created_at
            .cmp(&a.expense.created_at)
            .then_with(|| b.expense.id.cmp(&a.expense.id))
    });
    Ok(expenses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::schemas::SplitMode;
    use crate::store::{FailingStore, MemoryStore};
    use chrono::Duration;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn user(id: &str) -> UserId {
        id.to_string()
    }

    fn equal(description: &str, amount: &str, participants: &[&str]) -> ExpenseRequest {
        ExpenseRequest {
            description: description.to_string(),
            amount: money(amount),
            split_mode: SplitMode::Equal,
            participants: participants.iter().map(|p| p.to_string()).collect(),
            custom_amounts: None,
        }
    }

    #[tokio::test]
    async fn created_expense_carries_exact_shares() {
        let store = MemoryStore::new();
        let created = create_expense(&store, &user("A"), equal("taxi", "100", &["A", "B", "C"]))
            .await
            .unwrap();
        assert_eq!(created.expense.created_by, "A");
        assert_eq!(created.expense.description, "taxi");
        let amounts: Vec<Money> = created.shares.iter().map(|s| s.amount).collect();
        assert_eq!(
            amounts,
            vec![money("33.34"), money("33.33"), money("33.33")]
        );

        let stored = store.list_expense_shares(None).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn invalid_requests_store_nothing() {
        let store = MemoryStore::new();
        let err = create_expense(&store, &user("A"), equal("  ", "10", &["A"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = create_expense(&store, &user("A"), equal("lunch", "10", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert!(store.list_expenses(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn balances_and_plan_follow_recorded_expenses() {
        let store = MemoryStore::new();
        // A owes B 50, C owes A 20.
        create_expense(&store, &user("B"), equal("hotel", "50", &["A"]))
            .await
            .unwrap();
        create_expense(&store, &user("A"), equal("museum", "20", &["C"]))
            .await
            .unwrap();

        let balances = balances_for(&store, &user("A")).await.unwrap();
        assert_eq!(balances.summary.total_owed_to_user, money("20"));
        assert_eq!(balances.summary.total_user_owes, money("50"));
        assert_eq!(balances.summary.net, money("-30"));

        let plan = settlement_plan(&store).await.unwrap();
        assert_eq!(
            plan.instructions,
            vec![
                SettlementInstruction {
                    from: user("A"),
                    to: user("B"),
                    amount: money("30"),
                },
                SettlementInstruction {
                    from: user("C"),
                    to: user("B"),
                    amount: money("20"),
                },
            ]
        );
        assert!(plan.anomalies.is_empty());
    }

    #[tokio::test]
    async fn payments_settle_balances() {
        let store = MemoryStore::new();
        create_expense(&store, &user("A"), equal("rent", "80", &["A", "B"]))
            .await
            .unwrap();
        record_payment(
            &store,
            &user("B"),
            PaymentRequest {
                to: user("A"),
                amount: money("40"),
            },
        )
        .await
        .unwrap();

        let balances = balances_for(&store, &user("B")).await.unwrap();
        assert!(balances.counterparts.is_empty());
        let plan = settlement_plan(&store).await.unwrap();
        assert!(plan.instructions.is_empty());
    }

    #[tokio::test]
    async fn rejects_invalid_payments() {
        let store = MemoryStore::new();
        for request in [
            PaymentRequest {
                to: user("B"),
                amount: Money::ZERO,
            },
            PaymentRequest {
                to: user("A"),
                amount: money("5"),
            },
        ] {
            let err = record_payment(&store, &user("A"), request)
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        }
        assert!(store.list_payments(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn plan_reports_expenses_without_shares() {
        let store = MemoryStore::new();
        store
            .insert_raw(
                vec![Expense {
                    id: "broken".to_string(),
                    description: "half written".to_string(),
                    amount: money("12"),
                    split_mode: SplitMode::Equal,
                    created_by: user("A"),
                    created_at: Utc::now(),
                }],
                vec![],
            )
            .await;

        let plan = settlement_plan(&store).await.unwrap();
        assert!(plan.instructions.is_empty());
        assert_eq!(
            plan.anomalies,
            vec![LedgerAnomaly::ExpenseWithoutShares {
                expense_id: "broken".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn transaction_list_is_newest_first() {
        let store = MemoryStore::new();
        let first = create_expense(&store, &user("A"), equal("first", "10", &["A", "B"]))
            .await
            .unwrap();
        let second = create_expense(&store, &user("B"), equal("second", "10", &["A", "B"]))
            .await
            .unwrap();
        create_expense(&store, &user("C"), equal("unrelated", "10", &["C", "D"]))
            .await
            .unwrap();

        let listed = expenses_for(&store, &user("A"), &ExpenseFilter::default())
            .await
            .unwrap();
        let ids: Vec<&str> = listed.iter().map(|e| e.expense.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![second.expense.id.as_str(), first.expense.id.as_str()]
        );
        assert!(listed.iter().all(|e| e.shares.len() == 2));
    }

    #[tokio::test]
    async fn transaction_list_filters_by_description_and_day() {
        let store = MemoryStore::new();
        create_expense(&store, &user("A"), equal("Taxi to airport", "30", &["B"]))
            .await
            .unwrap();
        create_expense(&store, &user("A"), equal("groceries", "12", &["B"]))
            .await
            .unwrap();

        let search = ExpenseFilter {
            search: Some(" taxi ".to_string()),
            ..ExpenseFilter::default()
        };
        let listed = expenses_for(&store, &user("B"), &search).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].expense.description, "Taxi to airport");

        let today = Utc::now().date_naive();
        let from_today = ExpenseFilter {
            from: Some(today),
            to: Some(today),
            ..ExpenseFilter::default()
        };
        let listed = expenses_for(&store, &user("B"), &from_today).await.unwrap();
        assert_eq!(listed.len(), 2);

        let until_yesterday = ExpenseFilter {
            to: Some(today - Duration::days(1)),
            ..ExpenseFilter::default()
        };
        let listed = expenses_for(&store, &user("B"), &until_yesterday)
            .await
            .unwrap();
        assert!(listed.is_empty());

        let backwards = ExpenseFilter {
            from: Some(today),
            to: Some(today - Duration::days(1)),
            ..ExpenseFilter::default()
        };
        let err = expenses_for(&store, &user("B"), &backwards)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn oversized_custom_amounts_are_rejected_before_storing() {
        let store = MemoryStore::new();
        let huge = Money::from_minor(i64::MAX);
        let request = ExpenseRequest {
            description: "impossible".to_string(),
            amount: money("1"),
            split_mode: SplitMode::Custom,
            participants: vec![user("A"), user("B")],
            custom_amounts: Some(HashMap::from([(user("A"), huge), (user("B"), huge)])),
        };
        let err = create_expense(&store, &user("A"), request)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(store.list_expenses(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failures_surface_as_persistence_errors() {
        let reset = LedgerError::Persistence("connection reset".to_string());
        let store = FailingStore::new(reset.clone());

        let err = create_expense(&store, &user("A"), equal("taxi", "10", &["B"]))
            .await
            .unwrap_err();
        assert_eq!(err, reset);

        let err = balances_for(&store, &user("A")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));
        let err = settlement_plan(&store).await.unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(_)));

        // Bad input is still reported as such, without reaching the store.
        let err = create_expense(&store, &user("A"), equal("", "10", &["B"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}
