//! Subscription plan of the owner

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::error::StoreError;
use crate::models::{PlanType, Subscription, SubscriptionStatus};
use crate::queries::{parse_timestamp, subscriptions};

/// Length of the plan given to a user without a subscription row
pub const FREE_TRIAL_DAYS: i64 = 7;

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self) -> Result<Option<Subscription>, StoreError>;
    /// Switch to the monthly plan, active for one month from now
    async fn upgrade(&self) -> Result<Subscription, StoreError>;
    async fn set_status(&self, status: SubscriptionStatus) -> Result<Subscription, StoreError>;
}

/// Active and not past its expiry
pub fn is_active(subscription: Option<&Subscription>, now: DateTime<Utc>) -> bool {
    match subscription {
        Some(sub) if sub.status == SubscriptionStatus::Active => match sub.expires_at {
            Some(expires_at) => expires_at > now,
            None => true,
        },
        _ => false,
    }
}

/// Whole days left before expiry, rounded up, never negative
pub fn days_remaining(subscription: Option<&Subscription>, now: DateTime<Utc>) -> i64 {
    let Some(expires_at) = subscription.and_then(|s| s.expires_at) else {
        return 0;
    };
    let remaining_ms = (expires_at - now).num_milliseconds();
    if remaining_ms <= 0 {
        return 0;
    }
    let day_ms = Duration::days(1).num_milliseconds();
    (remaining_ms + day_ms - 1) / day_ms
}

pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
    user_id: String,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: SqlitePool, user_id: impl Into<String>) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
        }
    }

    /// Give a user without a subscription the free trial; existing rows are untouched
    pub async fn ensure_trial(&self) -> Result<Subscription, StoreError> {
        if let Some(existing) = self.get().await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let subscription = Subscription {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            plan_type: PlanType::FreeTrial,
            status: SubscriptionStatus::Active,
            started_at: now,
            expires_at: Some(now + Duration::days(FREE_TRIAL_DAYS)),
            created_at: now,
        };
        sqlx::query(&subscriptions::insert(&subscription))
            .execute(&self.pool)
            .await?;
        log::info!("Started {}-day free trial for {}", FREE_TRIAL_DAYS, self.user_id);
        Ok(subscription)
    }

    async fn require(&self) -> Result<Subscription, StoreError> {
        self.get()
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("subscription for '{}'", self.user_id)))
    }
}

fn subscription_from_row(row: &SqliteRow) -> Result<Subscription, StoreError> {
    let plan_type: String = row.try_get("plan_type")?;
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let expires_at: Option<String> = row.try_get("expires_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Subscription {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        plan_type: plan_type.parse().map_err(StoreError::Database)?,
        status: status.parse().map_err(StoreError::Database)?,
        started_at: parse_timestamp(&started_at).map_err(StoreError::Database)?,
        expires_at: expires_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(StoreError::Database)?,
        created_at: parse_timestamp(&created_at).map_err(StoreError::Database)?,
    })
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn get(&self) -> Result<Option<Subscription>, StoreError> {
        let sql = subscriptions::select_for_user(&self.user_id);
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn upgrade(&self) -> Result<Subscription, StoreError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_months(Months::new(1))
            .ok_or_else(|| StoreError::Invalid("expiry out of range".to_string()))?;

        let subscription = match self.get().await? {
            Some(mut existing) => {
                existing.plan_type = PlanType::Monthly;
                existing.status = SubscriptionStatus::Active;
                existing.expires_at = Some(expires_at);
                sqlx::query(&subscriptions::update_plan(&existing))
                    .execute(&self.pool)
                    .await?;
                existing
            }
            None => {
                let created = Subscription {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: self.user_id.clone(),
                    plan_type: PlanType::Monthly,
                    status: SubscriptionStatus::Active,
                    started_at: now,
                    expires_at: Some(expires_at),
                    created_at: now,
                };
                sqlx::query(&subscriptions::insert(&created))
                    .execute(&self.pool)
                    .await?;
                created
            }
        };

        log::info!("Upgraded {} to the monthly plan", self.user_id);
        Ok(subscription)
    }

    async fn set_status(&self, status: SubscriptionStatus) -> Result<Subscription, StoreError> {
        sqlx::query(&subscriptions::update_status(&self.user_id, status))
            .execute(&self.pool)
            .await?;
        self.require().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(status: SubscriptionStatus, expires_at: Option<DateTime<Utc>>) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: "s".to_string(),
            user_id: "u".to_string(),
            plan_type: PlanType::Monthly,
            status,
            started_at: now,
            expires_at,
            created_at: now,
        }
    }

    #[test]
    fn test_is_active() {
        let now = Utc::now();
        assert!(!is_active(None, now));
        let sub = subscription(SubscriptionStatus::Active, None);
        assert!(is_active(Some(&sub), now));
        let sub = subscription(SubscriptionStatus::Active, Some(now - Duration::minutes(1)));
        assert!(!is_active(Some(&sub), now));
        let sub = subscription(SubscriptionStatus::Cancelled, Some(now + Duration::days(3)));
        assert!(!is_active(Some(&sub), now));
    }

    #[test]
    fn test_days_remaining_rounds_up() {
        let now = Utc::now();
        let sub = subscription(
            SubscriptionStatus::Active,
            Some(now + Duration::days(2) + Duration::hours(1)),
        );
        assert_eq!(days_remaining(Some(&sub), now), 3);
        let sub = subscription(SubscriptionStatus::Active, Some(now - Duration::days(2)));
        assert_eq!(days_remaining(Some(&sub), now), 0);
        assert_eq!(days_remaining(None, now), 0);
    }
}
