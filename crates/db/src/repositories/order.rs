use std::collections::HashMap;

use sqlx::{sqlite::SqliteRow, Row};

use helpdesk_core::domain::menu::{MenuItemId, VariantOptionId};
use helpdesk_core::domain::order::{
    Order, OrderId, OrderLine, OrderStatus, Payment, PaymentId, PaymentStatus, SelectedOption,
};
use helpdesk_core::domain::user::UserId;

use super::codec::{parse_decimal, parse_enum, parse_timestamp, parse_u32, placeholders};
use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Loads lines (with their selected options) for the given orders, keyed by order id.
    async fn load_lines(
        &self,
        order_ids: &[&str],
    ) -> Result<HashMap<String, Vec<OrderLine>>, RepositoryError> {
        if order_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let line_sql = format!(
            "SELECT id, order_id, item_id, item_name, quantity, unit_price, line_total
             FROM order_line WHERE order_id IN ({}) ORDER BY order_id ASC, position ASC",
            placeholders(order_ids.len())
        );
        let mut query = sqlx::query(&line_sql);
        for id in order_ids {
            query = query.bind(*id);
        }
        let line_rows = query.fetch_all(&self.pool).await?;

        let option_sql = format!(
            "SELECT o.line_id, o.option_id, o.group_name, o.option_name, o.price_delta
             FROM order_line_option o
             JOIN order_line l ON l.id = o.line_id
             WHERE l.order_id IN ({}) ORDER BY o.line_id ASC, o.position ASC",
            placeholders(order_ids.len())
        );
        let mut query = sqlx::query(&option_sql);
        for id in order_ids {
            query = query.bind(*id);
        }
        let mut options_by_line: HashMap<String, Vec<SelectedOption>> = HashMap::new();
        for row in query.fetch_all(&self.pool).await? {
            let line_id: String = row.try_get("line_id")?;
            options_by_line.entry(line_id).or_default().push(SelectedOption {
                option_id: VariantOptionId(row.try_get("option_id")?),
                group_name: row.try_get("group_name")?,
                option_name: row.try_get("option_name")?,
                price_delta: parse_decimal("price_delta", row.try_get("price_delta")?)?,
            });
        }

        let mut lines_by_order: HashMap<String, Vec<OrderLine>> = HashMap::new();
        for row in line_rows {
            let id: String = row.try_get("id")?;
            let order_id: String = row.try_get("order_id")?;
            let options = options_by_line.remove(&id).unwrap_or_default();
            lines_by_order.entry(order_id).or_default().push(OrderLine {
                id,
                item_id: MenuItemId(row.try_get("item_id")?),
                item_name: row.try_get("item_name")?,
                quantity: parse_u32("quantity", row.try_get("quantity")?)?,
                unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
                options,
                line_total: parse_decimal("line_total", row.try_get("line_total")?)?,
            });
        }

        Ok(lines_by_order)
    }
}

const ORDER_COLUMNS: &str = "id, customer_id, status, payment_status, subtotal, tax, total,
    currency, notes, created_at, updated_at";

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO customer_order ({ORDER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&order.id.0)
        .bind(&order.customer_id.0)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.subtotal.to_string())
        .bind(order.tax.to_string())
        .bind(order.total.to_string())
        .bind(&order.currency)
        .bind(order.notes.as_deref())
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            RepositoryError::on_unique(error, format!("order `{}` already exists", order.id.0))
        })?;

        for (position, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_line (id, order_id, position, item_id, item_name, quantity, unit_price, line_total)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&line.id)
            .bind(&order.id.0)
            .bind(position as i64)
            .bind(&line.item_id.0)
            .bind(&line.item_name)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.to_string())
            .bind(line.line_total.to_string())
            .execute(&mut *tx)
            .await?;

            for (option_position, option) in line.options.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO order_line_option (line_id, position, option_id, group_name, option_name, price_delta)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&line.id)
                .bind(option_position as i64)
                .bind(&option.option_id.0)
                .bind(&option.group_name)
                .bind(&option.option_name)
                .bind(option.price_delta.to_string())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM customer_order WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut order = order_from_row(&row)?;
        let mut lines = self.load_lines(&[order.id.0.as_str()]).await?;
        order.lines = lines.remove(&order.id.0).unwrap_or_default();
        Ok(Some(order))
    }

    async fn list(&self, customer: Option<&UserId>) -> Result<Vec<Order>, RepositoryError> {
        let rows = match customer {
            Some(customer) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM customer_order WHERE customer_id = ?
                     ORDER BY created_at DESC, id DESC"
                ))
                .bind(&customer.0)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM customer_order ORDER BY created_at DESC, id DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<&str> = orders.iter().map(|order| order.id.0.as_str()).collect();
        let mut lines = self.load_lines(&ids).await?;
        for order in &mut orders {
            order.lines = lines.remove(&order.id.0).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn save_status(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE customer_order SET status = ?, payment_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.updated_at.to_rfc3339())
        .bind(&order.id.0)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("order `{}`", order.id.0)));
        }

        if order.payment_status == PaymentStatus::Refunded {
            sqlx::query("UPDATE payment SET status = 'refunded' WHERE order_id = ?")
                .bind(&order.id.0)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_payment(
        &self,
        order: &Order,
        payment: &Payment,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO payment (id, order_id, amount, method, reference, status, captured_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&payment.id.0)
        .bind(&payment.order_id.0)
        .bind(payment.amount.to_string())
        .bind(&payment.method)
        .bind(payment.reference.as_deref())
        .bind(payment.status.as_str())
        .bind(payment.captured_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            RepositoryError::on_unique(
                error,
                format!("order `{}` already has a payment", payment.order_id.0),
            )
        })?;

        sqlx::query("UPDATE customer_order SET payment_status = ?, updated_at = ? WHERE id = ?")
            .bind(order.payment_status.as_str())
            .bind(order.updated_at.to_rfc3339())
            .bind(&order.id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, order_id, amount, method, reference, status, captured_at
             FROM payment WHERE order_id = ?",
        )
        .bind(&order_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let status: String = row.try_get("status")?;
            Ok(Payment {
                id: PaymentId(row.try_get("id")?),
                order_id: OrderId(row.try_get("order_id")?),
                amount: parse_decimal("amount", row.try_get("amount")?)?,
                method: row.try_get("method")?,
                reference: row.try_get("reference")?,
                status: parse_enum("payment status", &status, PaymentStatus::parse)?,
                captured_at: parse_timestamp("captured_at", row.try_get("captured_at")?)?,
            })
        })
        .transpose()
    }
}

fn order_from_row(row: &SqliteRow) -> Result<Order, RepositoryError> {
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;
    Ok(Order {
        id: OrderId(row.try_get("id")?),
        customer_id: UserId(row.try_get("customer_id")?),
        status: parse_enum("order status", &status, OrderStatus::parse)?,
        payment_status: parse_enum("payment status", &payment_status, PaymentStatus::parse)?,
        lines: Vec::new(),
        subtotal: parse_decimal("subtotal", row.try_get("subtotal")?)?,
        tax: parse_decimal("tax", row.try_get("tax")?)?,
        total: parse_decimal("total", row.try_get("total")?)?,
        currency: row.try_get("currency")?,
        notes: row.try_get("notes")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
