use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    ConfigId, Currency, Money, NotificationId, OrderId, RefundId, TenantId, TransactionId,
};
use domain::{
    DomainError, FeePolicy, GatewayConfig, GatewayKind, OrderStatus, PayerInfo,
    PaymentMethod, PaymentNotification, PaymentOrder, PaymentRefund, PaymentTransaction,
    RefundStatus, TransactionStatus,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderQuery, Result, StoreError, TimeRange,
    store::{
        GatewayConfigRepository, NotificationRepository, OrderRepository, RefundRepository,
        TransactionRepository,
    },
};

const ORDER_COLUMNS: &str = "id, tenant_id, order_number, gateway, gateway_order_id, amount, \
    currency, convenience_fee, total_amount, purpose, description, ledger_record_id, payer_name, \
    payer_email, payer_phone, payer_user_id, status, expires_at, notes, receipt_url, \
    gateway_response, error_message, paid_at, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, tenant_id, order_id, gateway, gateway_order_id, \
    gateway_payment_id, amount, currency, method, status, signature, signature_verified, \
    error_code, error_message, gateway_response, authorized_at, captured_at, failed_at, \
    created_at, updated_at";

const REFUND_COLUMNS: &str = "id, tenant_id, transaction_id, order_id, amount, currency, reason, \
    status, gateway_refund_id, gateway_response, error_message, initiated_by, processed_at, \
    created_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, tenant_id, gateway, event_id, event_type, payload, \
    headers, signature, signature_valid, processed, processing_error, order_id, transaction_id, \
    received_at, processed_at";

const CONFIG_COLUMNS: &str = "id, tenant_id, gateway, key_id, key_secret, webhook_secret, \
    is_test_mode, is_active, is_default, supported_methods, fee_percent_bps, fee_fixed, \
    fee_pass_to_customer, display_name, created_at, updated_at";

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<PaymentOrder> {
        Ok(PaymentOrder {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            order_number: row.try_get("order_number")?,
            gateway: row.try_get::<String, _>("gateway")?.parse()?,
            gateway_order_id: row.try_get("gateway_order_id")?,
            amount: Money::from_minor(row.try_get("amount")?),
            currency: parse_currency(&row)?,
            convenience_fee: Money::from_minor(row.try_get("convenience_fee")?),
            total_amount: Money::from_minor(row.try_get("total_amount")?),
            purpose: row.try_get("purpose")?,
            description: row.try_get("description")?,
            ledger_record_id: row.try_get("ledger_record_id")?,
            payer: PayerInfo {
                name: row.try_get("payer_name")?,
                email: row.try_get("payer_email")?,
                phone: row.try_get("payer_phone")?,
                user_id: row.try_get("payer_user_id")?,
            },
            status: row.try_get::<String, _>("status")?.parse()?,
            expires_at: row.try_get("expires_at")?,
            notes: row.try_get("notes")?,
            receipt_url: row.try_get("receipt_url")?,
            gateway_response: row.try_get("gateway_response")?,
            error_message: row.try_get("error_message")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transaction(row: PgRow) -> Result<PaymentTransaction> {
        Ok(PaymentTransaction {
            id: TransactionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            gateway: row.try_get::<String, _>("gateway")?.parse()?,
            gateway_order_id: row.try_get("gateway_order_id")?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            amount: Money::from_minor(row.try_get("amount")?),
            currency: parse_currency(&row)?,
            method: row.try_get("method")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            signature: row.try_get("signature")?,
            signature_verified: row.try_get("signature_verified")?,
            error_code: row.try_get("error_code")?,
            error_message: row.try_get("error_message")?,
            gateway_response: row.try_get("gateway_response")?,
            authorized_at: row.try_get("authorized_at")?,
            captured_at: row.try_get("captured_at")?,
            failed_at: row.try_get("failed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_refund(row: PgRow) -> Result<PaymentRefund> {
        Ok(PaymentRefund {
            id: RefundId::from_uuid(row.try_get::<Uuid, _>("id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            transaction_id: TransactionId::from_uuid(row.try_get::<Uuid, _>("transaction_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            amount: Money::from_minor(row.try_get("amount")?),
            currency: parse_currency(&row)?,
            reason: row.try_get("reason")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            gateway_refund_id: row.try_get("gateway_refund_id")?,
            gateway_response: row.try_get("gateway_response")?,
            error_message: row.try_get("error_message")?,
            initiated_by: row.try_get("initiated_by")?,
            processed_at: row.try_get("processed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_notification(row: PgRow) -> Result<PaymentNotification> {
        Ok(PaymentNotification {
            id: NotificationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            tenant_id: row
                .try_get::<Option<Uuid>, _>("tenant_id")?
                .map(TenantId::from_uuid),
            gateway: row.try_get::<String, _>("gateway")?.parse()?,
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            headers: row.try_get("headers")?,
            signature: row.try_get("signature")?,
            signature_valid: row.try_get("signature_valid")?,
            processed: row.try_get("processed")?,
            processing_error: row.try_get("processing_error")?,
            order_id: row
                .try_get::<Option<Uuid>, _>("order_id")?
                .map(OrderId::from_uuid),
            transaction_id: row
                .try_get::<Option<Uuid>, _>("transaction_id")?
                .map(TransactionId::from_uuid),
            received_at: row.try_get("received_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }

    fn row_to_config(row: PgRow) -> Result<GatewayConfig> {
        let methods: Vec<String> = row.try_get("supported_methods")?;
        let supported_methods = methods
            .iter()
            .map(|m| m.parse::<PaymentMethod>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let percent_bps: i32 = row.try_get("fee_percent_bps")?;

        Ok(GatewayConfig {
            id: ConfigId::from_uuid(row.try_get::<Uuid, _>("id")?),
            tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id")?),
            gateway: row.try_get::<String, _>("gateway")?.parse()?,
            key_id: row.try_get("key_id")?,
            key_secret: SecretString::from(row.try_get::<String, _>("key_secret")?),
            webhook_secret: row
                .try_get::<Option<String>, _>("webhook_secret")?
                .map(SecretString::from),
            is_test_mode: row.try_get("is_test_mode")?,
            is_active: row.try_get("is_active")?,
            is_default: row.try_get("is_default")?,
            supported_methods,
            fee_policy: FeePolicy {
                percent_bps: u32::try_from(percent_bps).map_err(|_| {
                    DomainError::InvalidFeePolicy(format!("negative percent {percent_bps}"))
                })?,
                fixed: Money::from_minor(row.try_get("fee_fixed")?),
                pass_to_customer: row.try_get("fee_pass_to_customer")?,
            },
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Distinguishes a missing row from a status conflict after a conditional
    /// update matched nothing.
    async fn conditional_miss(
        &self,
        table: &str,
        entity: &'static str,
        id: Uuid,
        tenant_id: TenantId,
        expected: &str,
    ) -> StoreError {
        let sql = format!("SELECT status FROM {table} WHERE id = $1 AND tenant_id = $2");
        let actual: std::result::Result<Option<String>, _> = sqlx::query_scalar(&sql)
            .bind(id)
            .bind(tenant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await;
        match actual {
            Ok(Some(actual)) => StoreError::ConcurrencyConflict {
                entity,
                id: id.to_string(),
                expected: expected.to_string(),
                actual,
            },
            Ok(None) => StoreError::NotFound {
                entity,
                id: id.to_string(),
            },
            Err(e) => StoreError::Database(e),
        }
    }
}

fn parse_currency(row: &PgRow) -> Result<Currency> {
    let code: String = row.try_get("currency")?;
    code.parse::<Currency>()
        .map_err(|e| StoreError::Corrupt(DomainError::from(e)))
}

/// Maps a unique-constraint violation to `Duplicate`, leaving other errors as-is.
fn map_unique(entity: &'static str, key: &str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return StoreError::Duplicate {
                entity,
                key: key.to_string(),
            };
        }
        StoreError::Database(e)
    }
}

#[async_trait]
impl OrderRepository for PostgresPaymentStore {
    async fn insert_order(&self, order: &PaymentOrder) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payment_orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
              $19, $20, $21, $22, $23, $24, $25)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.tenant_id.as_uuid())
        .bind(&order.order_number)
        .bind(order.gateway.as_str())
        .bind(&order.gateway_order_id)
        .bind(order.amount.minor_units())
        .bind(order.currency.code())
        .bind(order.convenience_fee.minor_units())
        .bind(order.total_amount.minor_units())
        .bind(&order.purpose)
        .bind(&order.description)
        .bind(&order.ledger_record_id)
        .bind(&order.payer.name)
        .bind(&order.payer.email)
        .bind(&order.payer.phone)
        .bind(order.payer.user_id)
        .bind(order.status.as_str())
        .bind(order.expires_at)
        .bind(&order.notes)
        .bind(&order.receipt_url)
        .bind(&order.gateway_response)
        .bind(&order.error_message)
        .bind(order.paid_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique("order", &order.order_number))?;

        Ok(())
    }

    async fn update_order(&self, order: &PaymentOrder, expected: OrderStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_orders
            SET gateway_order_id = $3, status = $4, receipt_url = $5, gateway_response = $6,
                error_message = $7, paid_at = $8, notes = $9, updated_at = $10
            WHERE id = $1 AND tenant_id = $2 AND status = $11
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.tenant_id.as_uuid())
        .bind(&order.gateway_order_id)
        .bind(order.status.as_str())
        .bind(&order.receipt_url)
        .bind(&order.gateway_response)
        .bind(&order.error_message)
        .bind(order.paid_at)
        .bind(&order.notes)
        .bind(order.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_unique(
            "order",
            order.gateway_order_id.as_deref().unwrap_or(&order.order_number),
        ))?;

        if result.rows_affected() == 0 {
            return Err(self
                .conditional_miss(
                    "payment_orders",
                    "order",
                    order.id.as_uuid(),
                    order.tenant_id,
                    expected.as_str(),
                )
                .await);
        }
        Ok(())
    }

    async fn find_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Option<PaymentOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM payment_orders WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(order_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_number(
        &self,
        tenant_id: TenantId,
        order_number: &str,
    ) -> Result<Option<PaymentOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM payment_orders WHERE order_number = $1 AND tenant_id = $2"
        ))
        .bind(order_number)
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM payment_orders WHERE gateway_order_id = $1"
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders(
        &self,
        tenant_id: TenantId,
        query: &OrderQuery,
    ) -> Result<Vec<PaymentOrder>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM payment_orders WHERE tenant_id = $1");
        let mut param_count = 1;

        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${}", param_count));
        }
        if query.payer_user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND payer_user_id = ${}", param_count));
        }
        if query.created.from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${}", param_count));
        }
        if query.created.to.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at < ${}", param_count));
        }

        sql.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        let mut q = sqlx::query(&sql).bind(tenant_id.as_uuid());
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }
        if let Some(user_id) = query.payer_user_id {
            q = q.bind(user_id);
        }
        if let Some(from) = query.created.from {
            q = q.bind(from);
        }
        if let Some(to) = query.created.to {
            q = q.bind(to);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn expire_stale_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>> {
        let rows = sqlx::query(&format!(
            "UPDATE payment_orders SET status = 'EXPIRED', updated_at = $1 \
             WHERE status IN ('CREATED', 'PENDING') AND expires_at <= $1 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}

#[async_trait]
impl TransactionRepository for PostgresPaymentStore {
    async fn insert_transaction(&self, transaction: &PaymentTransaction) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payment_transactions ({TRANSACTION_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, \
              $19, $20)"
        ))
        .bind(transaction.id.as_uuid())
        .bind(transaction.tenant_id.as_uuid())
        .bind(transaction.order_id.as_uuid())
        .bind(transaction.gateway.as_str())
        .bind(&transaction.gateway_order_id)
        .bind(&transaction.gateway_payment_id)
        .bind(transaction.amount.minor_units())
        .bind(transaction.currency.code())
        .bind(&transaction.method)
        .bind(transaction.status.as_str())
        .bind(&transaction.signature)
        .bind(transaction.signature_verified)
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .bind(&transaction.gateway_response)
        .bind(transaction.authorized_at)
        .bind(transaction.captured_at)
        .bind(transaction.failed_at)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique("transaction", &transaction.id.to_string()))?;

        Ok(())
    }

    async fn update_transaction(
        &self,
        transaction: &PaymentTransaction,
        expected: TransactionStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET method = $3, status = $4, error_code = $5, error_message = $6,
                gateway_response = $7, authorized_at = $8, captured_at = $9, failed_at = $10,
                updated_at = $11
            WHERE id = $1 AND tenant_id = $2 AND status = $12
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.tenant_id.as_uuid())
        .bind(&transaction.method)
        .bind(transaction.status.as_str())
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .bind(&transaction.gateway_response)
        .bind(transaction.authorized_at)
        .bind(transaction.captured_at)
        .bind(transaction.failed_at)
        .bind(transaction.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .conditional_miss(
                    "payment_transactions",
                    "transaction",
                    transaction.id.as_uuid(),
                    transaction.tenant_id,
                    expected.as_str(),
                )
                .await);
        }
        Ok(())
    }

    async fn find_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions \
             WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(transaction_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn find_transaction_by_payment_id(
        &self,
        tenant_id: TenantId,
        gateway_payment_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions \
             WHERE gateway_payment_id = $1 AND tenant_id = $2 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(gateway_payment_id)
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_transaction).transpose()
    }

    async fn list_transactions_for_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Vec<PaymentTransaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions \
             WHERE order_id = $1 AND tenant_id = $2 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transaction).collect()
    }
}

#[async_trait]
impl RefundRepository for PostgresPaymentStore {
    async fn reserve_refund(&self, refund: &PaymentRefund, ceiling: Money) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Serialises reservations against the same order.
        sqlx::query("SELECT id FROM payment_orders WHERE id = $1 FOR UPDATE")
            .bind(refund.order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        let held: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_refunds \
             WHERE order_id = $1 AND status IN ('PENDING', 'COMPLETED')",
        )
        .bind(refund.order_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let available = ceiling - Money::from_minor(held);
        if refund.amount > available {
            return Err(StoreError::BalanceExceeded {
                transaction_id: refund.transaction_id.to_string(),
                available,
            });
        }

        sqlx::query(&format!(
            "INSERT INTO payment_refunds ({REFUND_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(refund.id.as_uuid())
        .bind(refund.tenant_id.as_uuid())
        .bind(refund.transaction_id.as_uuid())
        .bind(refund.order_id.as_uuid())
        .bind(refund.amount.minor_units())
        .bind(refund.currency.code())
        .bind(&refund.reason)
        .bind(refund.status.as_str())
        .bind(&refund.gateway_refund_id)
        .bind(&refund.gateway_response)
        .bind(&refund.error_message)
        .bind(&refund.initiated_by)
        .bind(refund.processed_at)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique("refund", &refund.id.to_string()))?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_refund(&self, refund: &PaymentRefund, expected: RefundStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_refunds
            SET status = $3, gateway_refund_id = $4, gateway_response = $5, error_message = $6,
                processed_at = $7, updated_at = $8
            WHERE id = $1 AND tenant_id = $2 AND status = $9
            "#,
        )
        .bind(refund.id.as_uuid())
        .bind(refund.tenant_id.as_uuid())
        .bind(refund.status.as_str())
        .bind(&refund.gateway_refund_id)
        .bind(&refund.gateway_response)
        .bind(&refund.error_message)
        .bind(refund.processed_at)
        .bind(refund.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .conditional_miss(
                    "payment_refunds",
                    "refund",
                    refund.id.as_uuid(),
                    refund.tenant_id,
                    expected.as_str(),
                )
                .await);
        }
        Ok(())
    }

    async fn list_refunds_for_transaction(
        &self,
        tenant_id: TenantId,
        transaction_id: TransactionId,
    ) -> Result<Vec<PaymentRefund>> {
        let rows = sqlx::query(&format!(
            "SELECT {REFUND_COLUMNS} FROM payment_refunds \
             WHERE transaction_id = $1 AND tenant_id = $2 ORDER BY created_at ASC"
        ))
        .bind(transaction_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_refund).collect()
    }

    async fn list_refunds_for_order(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Vec<PaymentRefund>> {
        let rows = sqlx::query(&format!(
            "SELECT {REFUND_COLUMNS} FROM payment_refunds \
             WHERE order_id = $1 AND tenant_id = $2 ORDER BY created_at ASC"
        ))
        .bind(order_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_refund).collect()
    }

    async fn list_refunds(
        &self,
        tenant_id: TenantId,
        range: TimeRange,
    ) -> Result<Vec<PaymentRefund>> {
        let rows = sqlx::query(&format!(
            "SELECT {REFUND_COLUMNS} FROM payment_refunds \
             WHERE tenant_id = $1 \
               AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2) \
               AND ($3::TIMESTAMPTZ IS NULL OR created_at < $3) \
             ORDER BY created_at ASC"
        ))
        .bind(tenant_id.as_uuid())
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_refund).collect()
    }
}

#[async_trait]
impl NotificationRepository for PostgresPaymentStore {
    async fn insert_notification(&self, notification: &PaymentNotification) -> Result<()> {
        let key = notification
            .event_id
            .clone()
            .unwrap_or_else(|| notification.id.to_string());
        sqlx::query(&format!(
            "INSERT INTO payment_notifications ({NOTIFICATION_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(notification.id.as_uuid())
        .bind(notification.tenant_id.map(|t| t.as_uuid()))
        .bind(notification.gateway.as_str())
        .bind(&notification.event_id)
        .bind(&notification.event_type)
        .bind(&notification.payload)
        .bind(&notification.headers)
        .bind(&notification.signature)
        .bind(notification.signature_valid)
        .bind(notification.processed)
        .bind(&notification.processing_error)
        .bind(notification.order_id.map(|o| o.as_uuid()))
        .bind(notification.transaction_id.map(|t| t.as_uuid()))
        .bind(notification.received_at)
        .bind(notification.processed_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique("notification", &key))?;

        Ok(())
    }

    async fn find_notification(&self, id: NotificationId) -> Result<Option<PaymentNotification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM payment_notifications WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_notification).transpose()
    }

    async fn find_notification_by_event_id(
        &self,
        gateway: GatewayKind,
        event_id: &str,
    ) -> Result<Option<PaymentNotification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM payment_notifications \
             WHERE gateway = $1 AND event_id = $2 AND signature_valid"
        ))
        .bind(gateway.as_str())
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_notification).transpose()
    }

    async fn list_unprocessed_notifications(
        &self,
        limit: usize,
    ) -> Result<Vec<PaymentNotification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM payment_notifications \
             WHERE NOT processed ORDER BY received_at ASC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_notification).collect()
    }

    async fn mark_notification_processed(
        &self,
        id: NotificationId,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE payment_notifications \
             SET processed = TRUE, processing_error = $2, processed_at = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "notification",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GatewayConfigRepository for PostgresPaymentStore {
    async fn save_config(&self, config: &GatewayConfig) -> Result<GatewayConfig> {
        let mut tx = self.pool.begin().await?;

        if config.is_default {
            sqlx::query(
                "UPDATE gateway_configs SET is_default = FALSE, updated_at = $3 \
                 WHERE tenant_id = $1 AND gateway <> $2 AND is_default",
            )
            .bind(config.tenant_id.as_uuid())
            .bind(config.gateway.as_str())
            .bind(config.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        let methods: Vec<String> = config
            .supported_methods
            .iter()
            .map(|m| m.as_str().to_string())
            .collect();
        let percent_bps = i32::try_from(config.fee_policy.percent_bps).map_err(|_| {
            DomainError::InvalidFeePolicy(format!("percent {}", config.fee_policy.percent_bps))
        })?;

        let row = sqlx::query(&format!(
            "INSERT INTO gateway_configs ({CONFIG_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (tenant_id, gateway) DO UPDATE SET \
                key_id = EXCLUDED.key_id, key_secret = EXCLUDED.key_secret, \
                webhook_secret = EXCLUDED.webhook_secret, is_test_mode = EXCLUDED.is_test_mode, \
                is_active = EXCLUDED.is_active, is_default = EXCLUDED.is_default, \
                supported_methods = EXCLUDED.supported_methods, \
                fee_percent_bps = EXCLUDED.fee_percent_bps, fee_fixed = EXCLUDED.fee_fixed, \
                fee_pass_to_customer = EXCLUDED.fee_pass_to_customer, \
                display_name = EXCLUDED.display_name, updated_at = EXCLUDED.updated_at \
             RETURNING {CONFIG_COLUMNS}"
        ))
        .bind(config.id.as_uuid())
        .bind(config.tenant_id.as_uuid())
        .bind(config.gateway.as_str())
        .bind(&config.key_id)
        .bind(config.key_secret.expose_secret())
        .bind(config.webhook_secret.as_ref().map(|s| s.expose_secret().to_string()))
        .bind(config.is_test_mode)
        .bind(config.is_active)
        .bind(config.is_default)
        .bind(methods)
        .bind(percent_bps)
        .bind(config.fee_policy.fixed.minor_units())
        .bind(config.fee_policy.pass_to_customer)
        .bind(&config.display_name)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::row_to_config(row)
    }

    async fn find_config(
        &self,
        tenant_id: TenantId,
        gateway: GatewayKind,
    ) -> Result<Option<GatewayConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM gateway_configs WHERE tenant_id = $1 AND gateway = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(gateway.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_config).transpose()
    }

    async fn list_configs(&self, tenant_id: TenantId) -> Result<Vec<GatewayConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONFIG_COLUMNS} FROM gateway_configs WHERE tenant_id = $1 \
             ORDER BY created_at ASC"
        ))
        .bind(tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_config).collect()
    }
}
