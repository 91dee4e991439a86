use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AccountError, AccountResult};
use crate::models::{Referral, ReferralEntry, ReferralStats};
use crate::repository::{ReferralRepository, UserRepository};

/// Outcome of a [`ReferralLedger::reconcile`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Half-written referrals whose user exists and were confirmed
    pub linked: usize,
    /// Half-written referrals without a matching user, removed
    pub discarded: usize,
}

/// Records referrer/referred pairs and derives listings and stats.
///
/// A referral is written in `linking` state before its referred user, and only
/// becomes visible once confirmed.
pub struct ReferralLedger<R: ReferralRepository, U: UserRepository> {
    referrals: Arc<R>,
    users: Arc<U>,
}

impl<R: ReferralRepository, U: UserRepository> Clone for ReferralLedger<R, U> {
    fn clone(&self) -> Self {
        Self {
            referrals: Arc::clone(&self.referrals),
            users: Arc::clone(&self.users),
        }
    }
}

impl<R: ReferralRepository, U: UserRepository> ReferralLedger<R, U> {
    pub fn new(referrals: Arc<R>, users: Arc<U>) -> Self {
        Self { referrals, users }
    }

    /// Phase one: write a `successful` referral that is not yet visible.
    #[instrument(skip(self))]
    pub async fn record_successful_referral(
        &self,
        referrer_id: Uuid,
        referred_user_id: Uuid,
    ) -> AccountResult<Referral> {
        self.referrals
            .insert(Referral::successful(referrer_id, referred_user_id))
            .await
    }

    /// Phase two after the user write succeeded.
    #[instrument(skip(self, referral), fields(referral_id = %referral.id))]
    pub async fn confirm_link(&self, referral: &Referral) -> AccountResult<()> {
        if self.referrals.mark_linked(referral.id).await? {
            Ok(())
        } else {
            Err(AccountError::Integrity(format!(
                "referral {} vanished before it was linked to user {}",
                referral.id, referral.referred_user_id
            )))
        }
    }

    /// Phase two after the user write failed.
    #[instrument(skip(self, referral), fields(referral_id = %referral.id))]
    pub async fn discard_link(&self, referral: &Referral) -> AccountResult<()> {
        self.referrals.discard(referral.id).await?;
        Ok(())
    }

    /// Visible referrals of `referrer_id`, oldest first, with referred user summaries.
    #[instrument(skip(self))]
    pub async fn list_by_referrer(&self, referrer_id: Uuid) -> AccountResult<Vec<ReferralEntry>> {
        let referrals = self.referrals.list_by_referrer(referrer_id).await?;
        let ids: Vec<Uuid> = referrals.iter().map(|r| r.referred_user_id).collect();

        let users: HashMap<Uuid, _> = self
            .users
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.summary()))
            .collect();

        Ok(referrals
            .into_iter()
            .map(|r| {
                let summary = users.get(&r.referred_user_id).cloned();
                ReferralEntry::new(r, summary)
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn aggregate_by_status(&self, referrer_id: Uuid) -> AccountResult<ReferralStats> {
        let mut stats = ReferralStats::new();
        for (status, count) in self.referrals.count_by_status(referrer_id).await? {
            if count > 0 {
                *stats.entry(status).or_default() += count;
            }
        }
        Ok(stats)
    }

    /// Settle referrals left in `linking` for longer than `grace`.
    ///
    /// A referral whose user exists and points back at the referrer is confirmed;
    /// any other is removed.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, grace: Duration) -> AccountResult<ReconcileReport> {
        let cutoff = Utc::now() - grace;
        let mut report = ReconcileReport::default();

        for referral in self.referrals.list_unlinked(cutoff).await? {
            let paired = self
                .users
                .get_by_id(referral.referred_user_id)
                .await?
                .is_some_and(|u| u.referred_by == Some(referral.referrer_id));

            if paired {
                self.referrals.mark_linked(referral.id).await?;
                report.linked += 1;
            } else {
                self.referrals.discard(referral.id).await?;
                report.discarded += 1;
            }
        }

        if report != ReconcileReport::default() {
            tracing::warn!(
                linked = report.linked,
                discarded = report.discarded,
                "Reconciled half-written referrals"
            );
        }
        Ok(report)
    }
}
