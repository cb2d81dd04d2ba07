use std::fs;

use chrono::{TimeZone, Utc};

use dropdb_core::{ProviderMeta, ProviderRun, ScrapedProduct};
use dropdb_master::{build_master, write_master, RunStore};

fn product(provider: i64, id: Option<i64>, name: &str, stock: Option<i64>) -> ScrapedProduct {
    ScrapedProduct {
        provider_name: "Acme".to_string(),
        provider_id: Some(provider),
        provider_url: format!("https://app.example.mx/dashboard/provider/{provider}/acme"),
        product_id: id,
        name: name.to_string(),
        category: "Hogar".to_string(),
        price_provider: Some("$ 249.00".to_string()),
        price_suggested: Some("$ 399.00".to_string()),
        stock,
        image: Some(format!("https://cdn.example.com/products/{name}.jpg")),
        href: id.map(|id| format!("https://app.example.mx/dashboard/product-details/{id}")),
        locale: None,
        card_provider_name: None,
        scraped_at: None,
    }
}

fn seed(store: &RunStore) {
    for (hour, stock) in [(8, None), (9, Some(12))] {
        let meta = ProviderMeta {
            provider_name: "Acme".to_string(),
            provider_id: Some(9),
            provider_url: "https://app.example.mx/dashboard/provider/9/acme".to_string(),
            locale: None,
            scraped_at: Utc.with_ymd_and_hms(2025, 5, 2, hour, 30, 0).unwrap(),
        };
        let items = vec![
            product(9, Some(451), "Widget", stock),
            product(9, None, "Lamp", None),
            product(9, Some(452), "Table", Some(1)),
        ];
        store.write(&ProviderRun::new(meta, items)).unwrap();
    }
}

#[test]
fn consolidating_twice_is_byte_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let store = RunStore::new(tmp.path());
    seed(&store);

    let first = write_master(tmp.path(), &build_master(&store).unwrap()).unwrap();
    let json_a = fs::read(&first.json).unwrap();
    let csv_a = fs::read(&first.csv).unwrap();

    let second = write_master(tmp.path(), &build_master(&store).unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(json_a, fs::read(&second.json).unwrap());
    assert_eq!(csv_a, fs::read(&second.csv).unwrap());
}

#[test]
fn stocked_duplicate_survives_across_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let store = RunStore::new(tmp.path());
    seed(&store);

    let master = build_master(&store).unwrap();
    assert_eq!(master.meta.total, 3);
    let widget = master
        .products
        .iter()
        .find(|r| r.product.product_id == Some(451))
        .unwrap();
    assert_eq!(widget.product.stock, Some(12));
    assert_eq!(widget.product.locale.as_deref(), Some("mexico"));
    assert_eq!(master.meta.by_locale.get("mexico"), Some(&3));
}
