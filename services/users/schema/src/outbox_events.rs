use sea_orm::entity::prelude::*;

/// Outbox row written in the same transaction as the mutation it announces.
/// Published to the broker by change capture; status is written back by the relay.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub aggregate_id: i64,
    pub aggregate_type: String,
    pub event_type: String,
    /// JSON document serialized as text.
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    /// `pending`, `processed` or `failed`.
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
