use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, QuerySelect};
use tracing::{info, instrument};

use crate::{
    entities::{ingredient, product, subscriber},
    errors::ServiceError,
    export::{export_filename, rows_to_csv, CsvRecord},
    services::orders::{OrderFilters, OrderService, MAX_ORDER_LIMIT},
};

/// A rendered CSV download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: String,
    pub body: String,
}

impl CsvExport {
    fn render<R: CsvRecord>(prefix: &str, rows: &[R]) -> Self {
        info!(rows = rows.len(), export = prefix, "csv export rendered");
        Self {
            filename: export_filename(prefix, Utc::now()),
            body: rows_to_csv(rows),
        }
    }
}

#[derive(Clone)]
pub struct ExportService {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
}

impl ExportService {
    pub fn new(db: Arc<DatabaseConnection>, orders: OrderService) -> Self {
        Self { db, orders }
    }

    /// Orders matching `filters`, up to the export cap regardless of the
    /// requested limit.
    #[instrument(skip(self))]
    pub async fn orders(&self, filters: OrderFilters) -> Result<CsvExport, ServiceError> {
        let filters = OrderFilters {
            limit: Some(MAX_ORDER_LIMIT),
            ..filters
        };
        let rows = self.orders.list_orders(&filters).await?;
        Ok(CsvExport::render("orders", &rows))
    }

    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<CsvExport, ServiceError> {
        let rows = product::Entity::find()
            .order_by_asc(product::Column::Name)
            .limit(MAX_ORDER_LIMIT)
            .all(&*self.db)
            .await?;
        Ok(CsvExport::render("products", &rows))
    }

    #[instrument(skip(self))]
    pub async fn ingredients(&self) -> Result<CsvExport, ServiceError> {
        let rows = ingredient::Entity::find()
            .order_by_asc(ingredient::Column::Name)
            .limit(MAX_ORDER_LIMIT)
            .all(&*self.db)
            .await?;
        Ok(CsvExport::render("ingredients", &rows))
    }

    #[instrument(skip(self))]
    pub async fn subscribers(&self) -> Result<CsvExport, ServiceError> {
        let rows = subscriber::Entity::find()
            .order_by_desc(subscriber::Column::CreatedAt)
            .limit(MAX_ORDER_LIMIT)
            .all(&*self.db)
            .await?;
        Ok(CsvExport::render("subscribers", &rows))
    }
}
