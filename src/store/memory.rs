use crate::error::LedgerResult;
use crate::schemas::{
    Expense, ExpenseId, ExpenseParticipantShare, NewExpense, NewPayment, NewShare, Payment,
    UserId, UserProfile,
};
use crate::store::ExpenseStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Tables {
    next_id: u64,
    expenses: BTreeMap<ExpenseId, Expense>,
    shares: Vec<ExpenseParticipantShare>,
    payments: Vec<Payment>,
    profiles: BTreeMap<UserId, UserProfile>,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:06}", self.next_id)
    }

    fn involved_expenses(&self, user: &UserId) -> BTreeSet<&ExpenseId> {
        let mut ids: BTreeSet<&ExpenseId> = self
            .shares
            .iter()
            .filter(|share| &share.user_id == user)
            .map(|share| &share.expense_id)
            .collect();
        ids.extend(
            self.expenses
                .values()
                .filter(|expense| &expense.created_by == user)
                .map(|expense| &expense.id),
        );
        ids
    }
}

/// Expense store held entirely in memory. Writes happen under a single lock,
/// so an expense and its shares always appear together.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts raw rows without any checks, to simulate a store that lost
    /// part of a write.
    #[cfg(test)]
    pub(crate) async fn insert_raw(
        &self,
        expenses: Vec<Expense>,
        shares: Vec<ExpenseParticipantShare>,
    ) {
        let mut tables = self.inner.lock().await;
        for expense in expenses {
            tables.expenses.insert(expense.id.clone(), expense);
        }
        tables.shares.extend(shares);
    }
}

#[async_trait]
impl ExpenseStore for MemoryStore {
    async fn list_expenses(&self, user_filter: Option<&UserId>) -> LedgerResult<Vec<Expense>> {
        let tables = self.inner.lock().await;
        let expenses = match user_filter {
            Some(user) => tables
                .involved_expenses(user)
                .into_iter()
                .filter_map(|id| tables.expenses.get(id).cloned())
                .collect(),
            None => tables.expenses.values().cloned().collect(),
        };
        Ok(expenses)
    }

    async fn list_expense_shares(
        &self,
        user_filter: Option<&UserId>,
    ) -> LedgerResult<Vec<(Expense, ExpenseParticipantShare)>> {
        let tables = self.inner.lock().await;
        let involved = user_filter.map(|user| tables.involved_expenses(user));
        let rows = tables
            .shares
            .iter()
            .filter(|share| {
                involved
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&share.expense_id))
            })
            .filter_map(|share| {
                tables
                    .expenses
                    .get(&share.expense_id)
                    .map(|expense| (expense.clone(), share.clone()))
            })
            .collect();
        Ok(rows)
    }

    async fn create_expense_with_shares(
        &self,
        expense: NewExpense,
        shares: Vec<NewShare>,
    ) -> LedgerResult<Expense> {
        let mut tables = self.inner.lock().await;
        let id = tables.next_id("expense");
        let expense = Expense {
            id: id.clone(),
            description: expense.description,
            amount: expense.amount,
            split_mode: expense.split_mode,
            created_by: expense.created_by,
            created_at: expense.created_at,
        };
        for share in shares {
            tables.shares.push(ExpenseParticipantShare {
                expense_id: id.clone(),
                user_id: share.user_id,
                amount: share.amount,
            });
        }
        tables.expenses.insert(id.clone(), expense.clone());
        debug!(expense_id = %id, "stored expense in memory");
        Ok(expense)
    }

    async fn record_payment(&self, payment: NewPayment) -> LedgerResult<Payment> {
        let mut tables = self.inner.lock().await;
        let payment = Payment {
            id: tables.next_id("payment"),
            from: payment.from,
            to: payment.to,
            amount: payment.amount,
            created_at: payment.created_at,
        };
        tables.payments.push(payment.clone());
        Ok(payment)
    }

    async fn list_payments(&self, user_filter: Option<&UserId>) -> LedgerResult<Vec<Payment>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .payments
            .iter()
            .filter(|payment| match user_filter {
                Some(user) => &payment.from == user || &payment.to == user,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn get_profile(&self, id: &UserId) -> LedgerResult<Option<UserProfile>> {
        Ok(self.inner.lock().await.profiles.get(id).cloned())
    }

    async fn insert_profile(&self, profile: UserProfile) -> LedgerResult<()> {
        let mut tables = self.inner.lock().await;
        tables.profiles.entry(profile.id.clone()).or_insert(profile);
        Ok(())
    }

    async fn list_profiles(&self) -> LedgerResult<Vec<UserProfile>> {
        Ok(self.inner.lock().await.profiles.values().cloned().collect())
    }
}
