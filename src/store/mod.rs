#[cfg(test)]
mod failing;
pub mod memory;
pub mod mongo;

use crate::error::LedgerResult;
use crate::schemas::{
    Expense, ExpenseParticipantShare, NewExpense, NewPayment, NewShare, Payment, UserId,
    UserProfile,
};
use async_trait::async_trait;

#[cfg(test)]
pub use failing::FailingStore;
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Durable record of expenses, their shares, payments and user profiles.
///
/// Every `user_filter` is explicit: `Some(user)` narrows the result to
/// records that involve that user, `None` returns the whole ledger.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// Expenses created by or shared with the user, including ones whose
    /// share rows are missing.
    async fn list_expenses(&self, user_filter: Option<&UserId>) -> LedgerResult<Vec<Expense>>;

    /// Every share of every expense the user is involved in, paired with
    /// its expense.
    async fn list_expense_shares(
        &self,
        user_filter: Option<&UserId>,
    ) -> LedgerResult<Vec<(Expense, ExpenseParticipantShare)>>;

    /// Stores an expense and all of its shares, or nothing at all.
    async fn create_expense_with_shares(
        &self,
        expense: NewExpense,
        shares: Vec<NewShare>,
    ) -> LedgerResult<Expense>;

    async fn record_payment(&self, payment: NewPayment) -> LedgerResult<Payment>;

    /// Payments the user sent or received.
    async fn list_payments(&self, user_filter: Option<&UserId>) -> LedgerResult<Vec<Payment>>;

    async fn get_profile(&self, id: &UserId) -> LedgerResult<Option<UserProfile>>;

    async fn insert_profile(&self, profile: UserProfile) -> LedgerResult<()>;

    async fn list_profiles(&self) -> LedgerResult<Vec<UserProfile>>;
}
