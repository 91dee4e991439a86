//! MongoDB repository tests
//!
//! Run the Mongo repositories against a real server started with
//! testcontainers. Docker is required, so the suite is ignored by default:
//!
//! ```sh
//! cargo test -p domain_referrals --test mongo_test -- --ignored
//! ```

use chrono::{Duration, Utc};
use domain_referrals::*;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::mongo::Mongo;
use uuid::Uuid;

/// Keeps the container alive for the lifetime of the test
struct TestMongo {
    #[allow(dead_code)]
    container: ContainerAsync<Mongo>,
    db: mongodb::Database,
}

impl TestMongo {
    async fn new() -> Self {
        let container = Mongo::default()
            .with_tag("8")
            .start()
            .await
            .expect("Failed to start MongoDB container");

        let port = container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");

        let client = mongodb::Client::with_uri_str(format!("mongodb://127.0.0.1:{port}"))
            .await
            .expect("Failed to connect to MongoDB");

        Self {
            container,
            db: client.database("referrals_test"),
        }
    }

    async fn repositories(&self) -> (MongoUserRepository, MongoReferralRepository) {
        let users = MongoUserRepository::new(&self.db);
        let referrals = MongoReferralRepository::new(&self.db);
        users.create_indexes().await.unwrap();
        referrals.create_indexes().await.unwrap();
        (users, referrals)
    }
}

fn user(name: &str, code: &str) -> User {
    User::new(name, &format!("{name}@example.com"), "hash".into(), code.into())
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_user_lookups_by_id() {
    let mongo = TestMongo::new().await;
    let (users, _) = mongo.repositories().await;

    let alice = users.create(user("alice", "AAAAAAAA")).await.unwrap();
    let bob = users.create(user("bob", "BBBBBBBB")).await.unwrap();

    let found = users.get_by_id(alice.id).await.unwrap().unwrap();
    assert_eq!(found.username, "alice");
    assert!(users.get_by_id(Uuid::now_v7()).await.unwrap().is_none());

    let mut many = users
        .get_many(&[bob.id, alice.id, Uuid::now_v7()])
        .await
        .unwrap();
    many.sort_by(|a, b| a.username.cmp(&b.username));
    assert_eq!(
        many.iter().map(|u| u.id).collect::<Vec<_>>(),
        [alice.id, bob.id]
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unique_indexes_report_the_field() {
    let mongo = TestMongo::new().await;
    let (users, _) = mongo.repositories().await;

    users.create(user("alice", "AAAAAAAA")).await.unwrap();

    let same_email = User::new("bob", "alice@example.com", "h".into(), "BBBBBBBB".into());
    assert!(matches!(
        users.create(same_email).await,
        Err(AccountError::Duplicate(DuplicateField::Email))
    ));

    let same_code = user("carol", "AAAAAAAA");
    assert!(matches!(
        users.create(same_code).await,
        Err(AccountError::Duplicate(DuplicateField::ReferralCode))
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reset_token_lifecycle() {
    let mongo = TestMongo::new().await;
    let (users, _) = mongo.repositories().await;
    let alice = users.create(user("alice", "AAAAAAAA")).await.unwrap();

    let expiry = Utc::now() + Duration::minutes(10);
    assert!(
        users
            .set_reset_token(alice.id, "digest".into(), expiry)
            .await
            .unwrap()
    );
    assert!(
        !users
            .set_reset_token(Uuid::now_v7(), "other".into(), expiry)
            .await
            .unwrap()
    );

    let before = users.take_by_reset_token("digest").await.unwrap().unwrap();
    assert_eq!(before.id, alice.id);
    assert_eq!(before.reset_token_hash.as_deref(), Some("digest"));
    assert!(users.take_by_reset_token("digest").await.unwrap().is_none());

    assert!(users.update_password(alice.id, "new-hash".into()).await.unwrap());
    let after = users.get_by_id(alice.id).await.unwrap().unwrap();
    assert_eq!(after.password_hash, "new-hash");
    assert!(after.reset_token_hash.is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_referral_link_lifecycle() {
    let mongo = TestMongo::new().await;
    let (_, referrals) = mongo.repositories().await;
    let referrer = Uuid::now_v7();

    let first = referrals
        .insert(Referral::successful(referrer, Uuid::now_v7()))
        .await
        .unwrap();
    let second = referrals
        .insert(Referral::successful(referrer, Uuid::now_v7()))
        .await
        .unwrap();

    assert!(referrals.list_by_referrer(referrer).await.unwrap().is_empty());
    assert_eq!(
        referrals.list_unlinked(Utc::now() + Duration::seconds(1)).await.unwrap().len(),
        2
    );

    assert!(referrals.mark_linked(first.id).await.unwrap());
    assert!(!referrals.mark_linked(Uuid::now_v7()).await.unwrap());

    let listed = referrals.list_by_referrer(referrer).await.unwrap();
    assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), [first.id]);
    assert_eq!(
        referrals.count_by_status(referrer).await.unwrap(),
        [(ReferralStatus::Successful, 1)]
    );

    assert!(referrals.discard(second.id).await.unwrap());
    assert!(!referrals.discard(second.id).await.unwrap());
    assert!(
        referrals
            .list_unlinked(Utc::now() + Duration::seconds(1))
            .await
            .unwrap()
            .is_empty()
    );

    let again = Referral::successful(Uuid::now_v7(), first.referred_user_id);
    assert!(matches!(
        referrals.insert(again).await,
        Err(AccountError::Duplicate(DuplicateField::ReferredUser))
    ));
}
