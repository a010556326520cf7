use chrono::{DateTime, Utc};
use domain::{OrderStatus, PaymentOrder};

/// Half-open `[from, to)` window over `created_at`. Either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at < to)
    }
}

/// Filter for listing a tenant's orders, newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by stored status.
    pub status: Option<OrderStatus>,

    /// Filter by creation time.
    pub created: TimeRange,

    /// Filter by payer user id.
    pub payer_user_id: Option<uuid::Uuid>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_from(mut self, from: DateTime<Utc>) -> Self {
        self.created.from = Some(from);
        self
    }

    pub fn created_before(mut self, to: DateTime<Utc>) -> Self {
        self.created.to = Some(to);
        self
    }

    pub fn payer_user_id(mut self, user_id: uuid::Uuid) -> Self {
        self.payer_user_id = Some(user_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Checks whether an order matches the filters (ignores limit/offset).
    pub fn matches(&self, order: &PaymentOrder) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(user_id) = self.payer_user_id
            && order.payer.user_id != Some(user_id)
        {
            return false;
        }
        self.created.contains(order.created_at)
    }
}
