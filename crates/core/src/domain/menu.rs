use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuCategoryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuItemId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantGroupId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantOptionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuCategory {
    pub id: MenuCategoryId,
    pub name: String,
    pub position: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub category_id: MenuCategoryId,
    pub name: String,
    pub description: String,
    pub base_price: Decimal,
    pub available: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantGroup {
    pub id: VariantGroupId,
    pub item_id: MenuItemId,
    pub name: String,
    pub required: bool,
    pub max_selections: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOption {
    pub id: VariantOptionId,
    pub group_id: VariantGroupId,
    pub name: String,
    pub price_delta: Decimal,
    pub available: bool,
}

/// A menu item together with its variant groups and their options, as needed for pricing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemDetail {
    pub item: MenuItem,
    pub groups: Vec<VariantGroupDetail>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantGroupDetail {
    pub group: VariantGroup,
    pub options: Vec<VariantOption>,
}

impl MenuItemDetail {
    /// Finds an option across all of the item's groups.
    pub fn find_option(
        &self,
        option_id: &VariantOptionId,
    ) -> Option<(&VariantGroupDetail, &VariantOption)> {
        self.groups.iter().find_map(|group| {
            group
                .options
                .iter()
                .find(|option| &option.id == option_id)
                .map(|option| (group, option))
        })
    }
}

/// A category with its items, as shown on the public menu.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSection {
    pub category: MenuCategory,
    pub items: Vec<MenuItemDetail>,
}
