use sea_query::{Asterisk, Expr, Query, SqliteQueryBuilder};

use super::format_timestamp;
use crate::models::{Subscription, SubscriptionStatus};
use crate::schema::Subscriptions;

/// SELECT * FROM subscriptions WHERE user_id = ?
pub fn select_for_user(user_id: &str) -> String {
    Query::select()
        .column(Asterisk)
        .from(Subscriptions::Table)
        .and_where(Expr::col(Subscriptions::UserId).eq(user_id))
        .to_string(SqliteQueryBuilder)
}

/// INSERT INTO subscriptions (...) VALUES (...)
pub fn insert(subscription: &Subscription) -> String {
    Query::insert()
        .into_table(Subscriptions::Table)
        .columns([
            Subscriptions::Id,
            Subscriptions::UserId,
            Subscriptions::PlanType,
            Subscriptions::Status,
            Subscriptions::StartedAt,
            Subscriptions::ExpiresAt,
            Subscriptions::CreatedAt,
        ])
        .values_panic([
            subscription.id.as_str().into(),
            subscription.user_id.as_str().into(),
            subscription.plan_type.as_str().into(),
            subscription.status.as_str().into(),
            format_timestamp(&subscription.started_at).into(),
            subscription.expires_at.as_ref().map(format_timestamp).into(),
            format_timestamp(&subscription.created_at).into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// UPDATE subscriptions SET plan_type = ?, status = ?, expires_at = ? WHERE user_id = ?
pub fn update_plan(subscription: &Subscription) -> String {
    Query::update()
        .table(Subscriptions::Table)
        .value(Subscriptions::PlanType, subscription.plan_type.as_str())
        .value(Subscriptions::Status, subscription.status.as_str())
        .value(
            Subscriptions::ExpiresAt,
            subscription.expires_at.as_ref().map(format_timestamp),
        )
        .and_where(Expr::col(Subscriptions::UserId).eq(subscription.user_id.as_str()))
        .to_string(SqliteQueryBuilder)
}

/// UPDATE subscriptions SET status = ? WHERE user_id = ?
pub fn update_status(user_id: &str, status: SubscriptionStatus) -> String {
    Query::update()
        .table(Subscriptions::Table)
        .value(Subscriptions::Status, status.as_str())
        .and_where(Expr::col(Subscriptions::UserId).eq(user_id))
        .to_string(SqliteQueryBuilder)
}
