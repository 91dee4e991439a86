//! MongoDB implementations of the account and referral repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Bson, Document, SerializerOptions, doc, to_bson_with_options},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AccountError, AccountResult, DuplicateField};
use crate::models::{LinkState, Referral, ReferralStatus, User};
use crate::repository::{ReferralRepository, UserRepository};

const USERS_COLLECTION: &str = "users";
const REFERRALS_COLLECTION: &str = "referrals";

const USERS_EMAIL_INDEX: &str = "users_email_unique";
const USERS_USERNAME_INDEX: &str = "users_username_unique";
const USERS_REFERRAL_CODE_INDEX: &str = "users_referral_code_unique";
const USERS_RESET_TOKEN_INDEX: &str = "users_reset_token_hash";
const REFERRALS_REFERRED_USER_INDEX: &str = "referrals_referred_user_unique";
const REFERRALS_REFERRER_INDEX: &str = "referrals_referrer_date";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Encode a field value the way `insert_one` writes it.
///
/// Inserts go through the raw document serializer, which is not human
/// readable, so a `Uuid` lands as generic binary rather than a string. Every
/// filter and `$set` value goes through here so that queries match stored
/// documents.
fn stored<T: serde::Serialize>(value: &T) -> AccountResult<Bson> {
    let options = SerializerOptions::builder().human_readable(false).build();
    Ok(to_bson_with_options(value, options)?)
}

fn id_bson(id: &Uuid) -> AccountResult<Bson> {
    stored(id)
}

fn unique_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(name.to_string())
                .build(),
        )
        .build()
}

fn named_index(keys: Document, name: &str, sparse: bool) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .sparse(sparse)
                .build(),
        )
        .build()
}

/// The unique index an insert collided with, if the error is a duplicate key.
fn duplicate_field(err: &mongodb::error::Error) -> Option<DuplicateField> {
    let ErrorKind::Write(WriteFailure::WriteError(write_error)) = err.kind.as_ref() else {
        return None;
    };
    if write_error.code != DUPLICATE_KEY_CODE {
        return None;
    }

    duplicate_field_from_message(&write_error.message)
}

fn duplicate_field_from_message(message: &str) -> Option<DuplicateField> {
    [
        (USERS_EMAIL_INDEX, DuplicateField::Email),
        (USERS_USERNAME_INDEX, DuplicateField::Username),
        (USERS_REFERRAL_CODE_INDEX, DuplicateField::ReferralCode),
        (REFERRALS_REFERRED_USER_INDEX, DuplicateField::ReferredUser),
    ]
    .into_iter()
    .find(|(index, _)| message.contains(index))
    .map(|(_, field)| field)
}

fn count_value(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or_default(),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or_default(),
        _ => 0,
    }
}

/// `users` collection
#[derive(Clone)]
pub struct MongoUserRepository {
    collection: Collection<User>,
}

impl MongoUserRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection::<User>(USERS_COLLECTION),
        }
    }

    /// Create the unique indexes the uniqueness guarantees rely on. Idempotent.
    #[instrument(skip(self))]
    pub async fn create_indexes(&self) -> AccountResult<()> {
        self.collection
            .create_indexes([
                unique_index(doc! { "email": 1 }, USERS_EMAIL_INDEX),
                unique_index(doc! { "username": 1 }, USERS_USERNAME_INDEX),
                unique_index(doc! { "referral_code": 1 }, USERS_REFERRAL_CODE_INDEX),
                named_index(doc! { "reset_token_hash": 1 }, USERS_RESET_TOKEN_INDEX, true),
            ])
            .await?;

        tracing::info!(collection = USERS_COLLECTION, "Indexes ensured");
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MongoUserRepository {
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn create(&self, user: User) -> AccountResult<User> {
        match self.collection.insert_one(&user).await {
            Ok(_) => {
                tracing::info!("Created user");
                Ok(user)
            }
            Err(e) => match duplicate_field(&e) {
                Some(field) => Err(AccountError::Duplicate(field)),
                None => Err(e.into()),
            },
        }
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: Uuid) -> AccountResult<Option<User>> {
        Ok(self
            .collection
            .find_one(doc! { "_id": id_bson(&id)? })
            .await?)
    }

    #[instrument(skip(self, email))]
    async fn get_by_email(&self, email: &str) -> AccountResult<Option<User>> {
        Ok(self.collection.find_one(doc! { "email": email }).await?)
    }

    #[instrument(skip(self))]
    async fn get_by_referral_code(&self, code: &str) -> AccountResult<Option<User>> {
        Ok(self
            .collection
            .find_one(doc! { "referral_code": code })
            .await?)
    }

    #[instrument(skip(self, email))]
    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> AccountResult<Option<User>> {
        let filter = doc! {
            "$or": [
                { "email": email },
                { "username": username },
            ]
        };
        Ok(self.collection.find_one(filter).await?)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_many(&self, ids: &[Uuid]) -> AccountResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = ids.iter().map(id_bson).collect::<AccountResult<Vec<_>>>()?;
        let cursor = self.collection.find(doc! { "_id": { "$in": ids } }).await?;
        Ok(cursor.try_collect().await?)
    }

    #[instrument(skip(self, token_hash))]
    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: String,
        expiry: DateTime<Utc>,
    ) -> AccountResult<bool> {
        let update = doc! {
            "$set": {
                "reset_token_hash": token_hash,
                "reset_token_expiry": stored(&expiry)?,
                "updated_at": stored(&Utc::now())?,
            }
        };
        let result = self
            .collection
            .update_one(doc! { "_id": id_bson(&id)? }, update)
            .await?;
        Ok(result.matched_count == 1)
    }

    #[instrument(skip(self, token_hash))]
    async fn take_by_reset_token(&self, token_hash: &str) -> AccountResult<Option<User>> {
        let update = doc! {
            "$unset": { "reset_token_hash": "", "reset_token_expiry": "" },
            "$set": { "updated_at": stored(&Utc::now())? },
        };
        // Returns the document as it was before the update
        Ok(self
            .collection
            .find_one_and_update(doc! { "reset_token_hash": token_hash }, update)
            .await?)
    }

    #[instrument(skip(self, password_hash))]
    async fn update_password(&self, id: Uuid, password_hash: String) -> AccountResult<bool> {
        let update = doc! {
            "$set": {
                "password_hash": password_hash,
                "updated_at": stored(&Utc::now())?,
            }
        };
        let result = self
            .collection
            .update_one(doc! { "_id": id_bson(&id)? }, update)
            .await?;
        Ok(result.matched_count == 1)
    }
}

/// `referrals` collection
#[derive(Clone)]
pub struct MongoReferralRepository {
    collection: Collection<Referral>,
}

impl MongoReferralRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection::<Referral>(REFERRALS_COLLECTION),
        }
    }

    #[instrument(skip(self))]
    pub async fn create_indexes(&self) -> AccountResult<()> {
        self.collection
            .create_indexes([
                unique_index(doc! { "referred_user_id": 1 }, REFERRALS_REFERRED_USER_INDEX),
                named_index(
                    doc! { "referrer_id": 1, "date_referred": 1 },
                    REFERRALS_REFERRER_INDEX,
                    false,
                ),
            ])
            .await?;

        tracing::info!(collection = REFERRALS_COLLECTION, "Indexes ensured");
        Ok(())
    }

    fn linked_by_referrer(referrer_id: &Uuid) -> AccountResult<Document> {
        Ok(doc! {
            "referrer_id": id_bson(referrer_id)?,
            "link_state": LinkState::Linked.to_string(),
        })
    }
}

#[async_trait]
impl ReferralRepository for MongoReferralRepository {
    #[instrument(skip(self, referral), fields(referral_id = %referral.id))]
    async fn insert(&self, referral: Referral) -> AccountResult<Referral> {
        match self.collection.insert_one(&referral).await {
            Ok(_) => Ok(referral),
            Err(e) => match duplicate_field(&e) {
                Some(field) => Err(AccountError::Duplicate(field)),
                None => Err(e.into()),
            },
        }
    }

    #[instrument(skip(self))]
    async fn mark_linked(&self, id: Uuid) -> AccountResult<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": id_bson(&id)? },
                doc! { "$set": { "link_state": LinkState::Linked.to_string() } },
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    #[instrument(skip(self))]
    async fn discard(&self, id: Uuid) -> AccountResult<bool> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id_bson(&id)? })
            .await?;
        Ok(result.deleted_count == 1)
    }

    #[instrument(skip(self))]
    async fn list_by_referrer(&self, referrer_id: Uuid) -> AccountResult<Vec<Referral>> {
        let cursor = self
            .collection
            .find(Self::linked_by_referrer(&referrer_id)?)
            .await?;
        let mut referrals: Vec<Referral> = cursor.try_collect().await?;

        referrals.sort_by(|a, b| {
            a.date_referred
                .cmp(&b.date_referred)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(referrals)
    }

    #[instrument(skip(self))]
    async fn count_by_status(
        &self,
        referrer_id: Uuid,
    ) -> AccountResult<Vec<(ReferralStatus, u64)>> {
        let pipeline = [
            doc! { "$match": Self::linked_by_referrer(&referrer_id)? },
            doc! { "$group": { "_id": "$status", "count": { "$sum": 1 } } },
        ];

        let groups: Vec<Document> = self.collection.aggregate(pipeline).await?.try_collect().await?;

        let mut counts = Vec::with_capacity(groups.len());
        for group in groups {
            let status = group
                .get_str("_id")
                .ok()
                .and_then(|s| s.parse::<ReferralStatus>().ok())
                .ok_or_else(|| {
                    AccountError::Database(format!("Unexpected referral status group: {group}"))
                })?;
            counts.push((status, count_value(group.get("count"))));
        }
        Ok(counts)
    }

    #[instrument(skip(self))]
    async fn list_unlinked(&self, cutoff: DateTime<Utc>) -> AccountResult<Vec<Referral>> {
        let cursor = self
            .collection
            .find(doc! { "link_state": LinkState::Linking.to_string() })
            .await?;
        let referrals: Vec<Referral> = cursor.try_collect().await?;

        Ok(referrals
            .into_iter()
            .filter(|r| r.date_referred < cutoff)
            .collect())
    }
}
