use std::collections::HashMap;

use sqlx::{sqlite::SqliteRow, Row};

use helpdesk_core::domain::menu::{
    MenuCategory, MenuCategoryId, MenuItem, MenuItemDetail, MenuItemId, MenuSection, VariantGroup,
    VariantGroupDetail, VariantGroupId, VariantOption, VariantOptionId,
};

use super::codec::{parse_decimal, parse_u32, placeholders};
use super::{MenuRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMenuRepository {
    pool: DbPool,
}

impl SqlMenuRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const ITEM_COLUMNS: &str = "id, category_id, name, description, base_price, available";

#[async_trait::async_trait]
impl MenuRepository for SqlMenuRepository {
    async fn insert_category(&self, category: &MenuCategory) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO menu_category (id, name, position) VALUES (?, ?, ?)")
            .bind(&category.id.0)
            .bind(&category.name)
            .bind(category.position)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                RepositoryError::on_unique(
                    error,
                    format!("menu category `{}` already exists", category.name),
                )
            })?;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<MenuCategory>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, position FROM menu_category ORDER BY position ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(MenuCategory {
                    id: MenuCategoryId(row.try_get("id")?),
                    name: row.try_get("name")?,
                    position: row.try_get("position")?,
                })
            })
            .collect()
    }

    async fn insert_item(&self, item: &MenuItem) -> Result<(), RepositoryError> {
        sqlx::query(&format!("INSERT INTO menu_item ({ITEM_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"))
            .bind(&item.id.0)
            .bind(&item.category_id.0)
            .bind(&item.name)
            .bind(&item.description)
            .bind(item.base_price.to_string())
            .bind(item.available)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                RepositoryError::on_unique(
                    error,
                    format!("menu item `{}` already exists", item.id.0),
                )
            })?;
        Ok(())
    }

    async fn find_item(&self, id: &MenuItemId) -> Result<Option<MenuItem>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM menu_item WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| item_from_row(&row)).transpose()
    }

    async fn set_item_availability(
        &self,
        id: &MenuItemId,
        available: bool,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE menu_item SET available = ? WHERE id = ?")
            .bind(available)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_group(&self, group: &VariantGroup) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO variant_group (id, item_id, name, required, max_selections)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&group.id.0)
        .bind(&group.item_id.0)
        .bind(&group.name)
        .bind(group.required)
        .bind(i64::from(group.max_selections))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_group(
        &self,
        id: &VariantGroupId,
    ) -> Result<Option<VariantGroup>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, item_id, name, required, max_selections FROM variant_group WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| group_from_row(&row)).transpose()
    }

    async fn insert_option(&self, option: &VariantOption) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO variant_option (id, group_id, name, price_delta, available)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&option.id.0)
        .bind(&option.group_id.0)
        .bind(&option.name)
        .bind(option.price_delta.to_string())
        .bind(option.available)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_details(
        &self,
        ids: &[MenuItemId],
    ) -> Result<HashMap<MenuItemId, MenuItemDetail>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let item_sql = format!(
            "SELECT {ITEM_COLUMNS} FROM menu_item WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&item_sql);
        for id in ids {
            query = query.bind(id.0.as_str());
        }
        let items = query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(item_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        if items.is_empty() {
            return Ok(HashMap::new());
        }

        let group_sql = format!(
            "SELECT id, item_id, name, required, max_selections FROM variant_group
             WHERE item_id IN ({}) ORDER BY rowid ASC",
            placeholders(items.len())
        );
        let mut query = sqlx::query(&group_sql);
        for item in &items {
            query = query.bind(item.id.0.as_str());
        }
        let groups = query
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(group_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let mut options_by_group: HashMap<VariantGroupId, Vec<VariantOption>> = HashMap::new();
        if !groups.is_empty() {
            let option_sql = format!(
                "SELECT id, group_id, name, price_delta, available FROM variant_option
                 WHERE group_id IN ({}) ORDER BY rowid ASC",
                placeholders(groups.len())
            );
            let mut query = sqlx::query(&option_sql);
            for group in &groups {
                query = query.bind(group.id.0.as_str());
            }
            for row in query.fetch_all(&self.pool).await? {
                let option = option_from_row(&row)?;
                options_by_group.entry(option.group_id.clone()).or_default().push(option);
            }
        }

        let mut groups_by_item: HashMap<MenuItemId, Vec<VariantGroupDetail>> = HashMap::new();
        for group in groups {
            let options = options_by_group.remove(&group.id).unwrap_or_default();
            groups_by_item
                .entry(group.item_id.clone())
                .or_default()
                .push(VariantGroupDetail { group, options });
        }

        Ok(items
            .into_iter()
            .map(|item| {
                let groups = groups_by_item.remove(&item.id).unwrap_or_default();
                (item.id.clone(), MenuItemDetail { item, groups })
            })
            .collect())
    }

    async fn list_sections(
        &self,
        include_unavailable: bool,
    ) -> Result<Vec<MenuSection>, RepositoryError> {
        let categories = self.list_categories().await?;
        let rows = sqlx::query("SELECT id, category_id FROM menu_item ORDER BY name ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        let mut ordered: Vec<(MenuCategoryId, MenuItemId)> = Vec::with_capacity(rows.len());
        for row in rows {
            ordered.push((
                MenuCategoryId(row.try_get("category_id")?),
                MenuItemId(row.try_get("id")?),
            ));
        }

        let ids: Vec<MenuItemId> = ordered.iter().map(|(_, id)| id.clone()).collect();
        let mut details = self.load_details(&ids).await?;

        let mut sections = Vec::with_capacity(categories.len());
        for category in categories {
            let mut items = Vec::new();
            for (category_id, item_id) in &ordered {
                if category_id != &category.id {
                    continue;
                }
                let Some(mut detail) = details.remove(item_id) else {
                    continue;
                };
                if !include_unavailable {
                    if !detail.item.available {
                        continue;
                    }
                    for group in &mut detail.groups {
                        group.options.retain(|option| option.available);
                    }
                }
                items.push(detail);
            }
            if include_unavailable || !items.is_empty() {
                sections.push(MenuSection { category, items });
            }
        }

        Ok(sections)
    }
}

fn item_from_row(row: &SqliteRow) -> Result<MenuItem, RepositoryError> {
    Ok(MenuItem {
        id: MenuItemId(row.try_get("id")?),
        category_id: MenuCategoryId(row.try_get("category_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        base_price: parse_decimal("base_price", row.try_get("base_price")?)?,
        available: row.try_get("available")?,
    })
}

fn group_from_row(row: &SqliteRow) -> Result<VariantGroup, RepositoryError> {
    Ok(VariantGroup {
        id: VariantGroupId(row.try_get("id")?),
        item_id: MenuItemId(row.try_get("item_id")?),
        name: row.try_get("name")?,
        required: row.try_get("required")?,
        max_selections: parse_u32("max_selections", row.try_get("max_selections")?)?,
    })
}

fn option_from_row(row: &SqliteRow) -> Result<VariantOption, RepositoryError> {
    Ok(VariantOption {
        id: VariantOptionId(row.try_get("id")?),
        group_id: VariantGroupId(row.try_get("group_id")?),
        name: row.try_get("name")?,
        price_delta: parse_decimal("price_delta", row.try_get("price_delta")?)?,
        available: row.try_get("available")?,
    })
}
