use crate::error::{LedgerError, LedgerResult};
use crate::schemas::{
    Expense, ExpenseParticipantShare, NewExpense, NewPayment, NewShare, Payment, UserId,
    UserProfile,
};
use crate::store::ExpenseStore;
use async_trait::async_trait;

/// A store whose every call fails with the same error.
pub struct FailingStore {
    error: LedgerError,
}

impl FailingStore {
    pub fn new(error: LedgerError) -> Self {
        Self { error }
    }

    fn fail<T>(&self) -> LedgerResult<T> {
        Err(self.error.clone())
    }
}

#[async_trait]
impl ExpenseStore for FailingStore {
    async fn list_expenses(&self, _user_filter: Option<&UserId>) -> LedgerResult<Vec<Expense>> {
        self.fail()
    }

    async fn list_expense_shares(
        &self,
        _user_filter: Option<&UserId>,
    ) -> LedgerResult<Vec<(Expense, ExpenseParticipantShare)>> {
        self.fail()
    }

    async fn create_expense_with_shares(
        &self,
        _expense: NewExpense,
        _shares: Vec<NewShare>,
    ) -> LedgerResult<Expense> {
        self.fail()
    }

    async fn record_payment(&self, _payment: NewPayment) -> LedgerResult<Payment> {
        self.fail()
    }

    async fn list_payments(&self, _user_filter: Option<&UserId>) -> LedgerResult<Vec<Payment>> {
        self.fail()
    }

    async fn get_profile(&self, _id: &UserId) -> LedgerResult<Option<UserProfile>> {
        self.fail()
    }

    async fn insert_profile(&self, _profile: UserProfile) -> LedgerResult<()> {
        self.fail()
    }

    async fn list_profiles(&self) -> LedgerResult<Vec<UserProfile>> {
        self.fail()
    }
}
