use serde_json::{Map, Value};

/// Field stripping applied to the processed copy of a payload before it
/// reaches the catalog. The audit copy is never redacted. Only listed
/// fields are removed; unknown fields pass through untouched.
const PRODUCT_FIELDS: &[&str] = &["created_at", "updated_at", "archived_at"];
const VARIANT_FIELDS: &[&str] = &[
    "image_url",
    "stock_quantity",
    "is_default",
    "stockStatus",
    "lab_test_codes_id",
    "service_product_id",
    "cpr_price",
    "archived_at",
];
const CATEGORY_FIELDS: &[&str] = &["user_id", "created_at", "last_modified", "image"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Root,
    Products,
    Variants,
    Categories,
}

impl Context {
    fn stripped_fields(self) -> &'static [&'static str] {
        match self {
            Context::Root => &[],
            Context::Products => PRODUCT_FIELDS,
            Context::Variants => VARIANT_FIELDS,
            Context::Categories => CATEGORY_FIELDS,
        }
    }

    fn for_key(self, key: &str) -> Context {
        match key {
            "products" => Context::Products,
            "product_variants" => Context::Variants,
            "categories" => Context::Categories,
            _ => self,
        }
    }
}

pub fn redact(payload: &Value) -> Value {
    walk(payload, Context::Root)
}

fn walk(value: &Value, context: Context) -> Value {
    match value {
        Value::Object(map) => {
            // Category objects can sit in untagged structures under a
            // product; they are recognized by their field set.
            let context = if context == Context::Products
                && map.contains_key("id")
                && map.contains_key("name")
                && map.contains_key("is_featured")
            {
                Context::Categories
            } else {
                context
            };

            let mut result = Map::new();
            for (key, nested) in map {
                if context.stripped_fields().contains(&key.as_str()) {
                    continue;
                }
                result.insert(key.clone(), walk(nested, context.for_key(key)));
            }
            Value::Object(result)
        }
        Value::Array(items) => {
            let context = item_context(items, context);
            Value::Array(items.iter().map(|item| walk(item, context)).collect())
        }
        scalar => scalar.clone(),
    }
}

/// Lists under a product are sniffed by their first element: variant
/// rows carry `product_id`, category rows carry `is_featured`.
fn item_context(items: &[Value], context: Context) -> Context {
    if context != Context::Products {
        return context;
    }
    match items.first().and_then(Value::as_object) {
        Some(first) if first.contains_key("product_id") => Context::Variants,
        Some(first) if first.contains_key("is_featured") => Context::Categories,
        _ => context,
    }
}
