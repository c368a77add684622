use crate::error::LedgerResult;
use crate::money::Money;
use crate::schemas::{
    Expense, ExpenseParticipantShare, NewExpense, NewPayment, NewShare, Payment, SplitMode,
    UserId, UserProfile,
};
use crate::store::ExpenseStore;
use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Document};
use futures::TryStreamExt;
use mongodb::options::UpdateOptions;
use mongodb::{Client, Collection, Database};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const EXPENSES: &str = "expenses";
const SHARES: &str = "expense_participants";
const PAYMENTS: &str = "payments";
const USERS: &str = "users";

#[derive(Debug, Deserialize, Serialize)]
struct ExpenseDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    description: String,
    amount: Money,
    split_type: SplitMode,
    created_by: UserId,
    created_at: bson::DateTime,
}

impl From<ExpenseDocument> for Expense {
    fn from(doc: ExpenseDocument) -> Self {
        Expense {
            id: doc.id.to_hex(),
            description: doc.description,
            amount: doc.amount,
            split_mode: doc.split_type,
            created_by: doc.created_by,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ShareDocument {
    expense_id: ObjectId,
    user_id: UserId,
    amount: Money,
}

#[derive(Debug, Deserialize, Serialize)]
struct PaymentDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    from: UserId,
    to: UserId,
    amount: Money,
    created_at: bson::DateTime,
}

impl From<PaymentDocument> for Payment {
    fn from(doc: PaymentDocument) -> Self {
        Payment {
            id: doc.id.to_hex(),
            from: doc.from,
            to: doc.to,
            amount: doc.amount,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ProfileDocument {
    #[serde(rename = "_id")]
    id: UserId,
    display_name: String,
    avatar_url: Option<String>,
    created_at: bson::DateTime,
}

impl From<ProfileDocument> for UserProfile {
    fn from(doc: ProfileDocument) -> Self {
        UserProfile {
            id: doc.id,
            display_name: doc.display_name,
            avatar_url: doc.avatar_url,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

/// Expense store backed by MongoDB. Expense inserts run in a multi-document
/// transaction, which needs a replica set or sharded cluster.
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> LedgerResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let database = client.database(database);
        info!(database = database.name(), "connected to MongoDB");
        Ok(Self { client, database })
    }

    fn expenses(&self) -> Collection<ExpenseDocument> {
        self.database.collection(EXPENSES)
    }

    fn shares(&self) -> Collection<ShareDocument> {
        self.database.collection(SHARES)
    }

    fn payments(&self) -> Collection<PaymentDocument> {
        self.database.collection(PAYMENTS)
    }

    fn users(&self) -> Collection<ProfileDocument> {
        self.database.collection(USERS)
    }

    async fn find_expenses(&self, filter: Document) -> LedgerResult<Vec<ExpenseDocument>> {
        let cursor = self.expenses().find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_shares(&self, filter: Document) -> LedgerResult<Vec<ShareDocument>> {
        let cursor = self.shares().find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    /// Expenses created by the user or with a share of theirs.
    async fn involved_expenses(&self, user: &UserId) -> LedgerResult<Vec<ExpenseDocument>> {
        let shared: Vec<ObjectId> = self
            .find_shares(doc! { "user_id": user })
            .await?
            .into_iter()
            .map(|share| share.expense_id)
            .collect();
        self.find_expenses(doc! {
            "$or": [
                { "_id": { "$in": shared } },
                { "created_by": user },
            ]
        })
        .await
    }

    async fn insert_expense_and_shares(
        &self,
        session: &mut mongodb::ClientSession,
        expense: &ExpenseDocument,
        shares: &[ShareDocument],
    ) -> LedgerResult<()> {
        self.expenses()
            .insert_one_with_session(expense, None, session)
            .await?;
        if !shares.is_empty() {
            self.shares()
                .insert_many_with_session(shares, None, session)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ExpenseStore for MongoStore {
    async fn list_expenses(&self, user_filter: Option<&UserId>) -> LedgerResult<Vec<Expense>> {
        let docs = match user_filter {
            Some(user) => self.involved_expenses(user).await?,
            None => self.find_expenses(doc! {}).await?,
        };
        Ok(docs.into_iter().map(Expense::from).collect())
    }

    async fn list_expense_shares(
        &self,
        user_filter: Option<&UserId>,
    ) -> LedgerResult<Vec<(Expense, ExpenseParticipantShare)>> {
        let (expenses, shares) = match user_filter {
            Some(user) => {
                let expenses = self.involved_expenses(user).await?;
                let ids: Vec<ObjectId> = expenses.iter().map(|expense| expense.id).collect();
                let filter = doc! { "expense_id": { "$in": ids } };
                let shares = self.find_shares(filter).await?;
                (expenses, shares)
            }
            None => (
                self.find_expenses(doc! {}).await?,
                self.find_shares(doc! {}).await?,
            ),
        };

        let expenses: HashMap<ObjectId, Expense> = expenses
            .into_iter()
            .map(|doc| (doc.id, Expense::from(doc)))
            .collect();
        let mut rows = Vec::with_capacity(shares.len());
        for share in shares {
            match expenses.get(&share.expense_id) {
                Some(expense) => rows.push((
                    expense.clone(),
                    ExpenseParticipantShare {
                        expense_id: expense.id.clone(),
                        user_id: share.user_id,
                        amount: share.amount,
                    },
                )),
                None => warn!(
                    expense_id = %share.expense_id,
                    user_id = %share.user_id,
                    "share row without an expense"
                ),
            }
        }
        Ok(rows)
    }

    async fn create_expense_with_shares(
        &self,
        expense: NewExpense,
        shares: Vec<NewShare>,
    ) -> LedgerResult<Expense> {
        let document = ExpenseDocument {
            id: ObjectId::new(),
            description: expense.description,
            amount: expense.amount,
            split_type: expense.split_mode,
            created_by: expense.created_by,
            created_at: bson::DateTime::from_chrono(expense.created_at),
        };
        let share_documents: Vec<ShareDocument> = shares
            .into_iter()
            .map(|share| ShareDocument {
                expense_id: document.id,
                user_id: share.user_id,
                amount: share.amount,
            })
            .collect();

        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        if let Err(err) = self
            .insert_expense_and_shares(&mut session, &document, &share_documents)
            .await
        {
            warn!(error = %err, "aborting expense transaction");
            session.abort_transaction().await?;
            return Err(err);
        }
        session.commit_transaction().await?;

        debug!(expense_id = %document.id, shares = share_documents.len(), "stored expense");
        Ok(document.into())
    }

    async fn record_payment(&self, payment: NewPayment) -> LedgerResult<Payment> {
        let document = PaymentDocument {
            id: ObjectId::new(),
            from: payment.from,
            to: payment.to,
            amount: payment.amount,
            created_at: bson::DateTime::from_chrono(payment.created_at),
        };
        self.payments().insert_one(&document, None).await?;
        Ok(document.into())
    }

    async fn list_payments(&self, user_filter: Option<&UserId>) -> LedgerResult<Vec<Payment>> {
        let filter = match user_filter {
            Some(user) => doc! { "$or": [ { "from": user }, { "to": user } ] },
            None => doc! {},
        };
        let cursor = self.payments().find(filter, None).await?;
        let docs: Vec<PaymentDocument> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(Payment::from).collect())
    }

    async fn get_profile(&self, id: &UserId) -> LedgerResult<Option<UserProfile>> {
        Ok(self
            .users()
            .find_one(doc! { "_id": id }, None)
            .await?
            .map(UserProfile::from))
    }

    async fn insert_profile(&self, profile: UserProfile) -> LedgerResult<()> {
        // Upsert so two first requests from the same user cannot race into
        // a duplicate key error.
        let options = UpdateOptions::builder().upsert(true).build();
        self.users()
            .update_one(
                doc! { "_id": &profile.id },
                doc! { "$setOnInsert": {
                    "display_name": &profile.display_name,
                    "avatar_url": &profile.avatar_url,
                    "created_at": bson::DateTime::from_chrono(profile.created_at),
                }},
                options,
            )
            .await?;
        Ok(())
    }

    async fn list_profiles(&self) -> LedgerResult<Vec<UserProfile>> {
        let cursor = self.users().find(doc! {}, None).await?;
        let docs: Vec<ProfileDocument> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(UserProfile::from).collect())
    }
}
