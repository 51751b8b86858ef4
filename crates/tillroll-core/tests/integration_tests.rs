//! Integration tests for tillroll-core
//!
//! These tests exercise the full bundle → reconcile → link → normalize → fold workflow.

use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tillroll_core::{
    parse_price,
    test_utils::{fixtures, MockOllamaServer},
    AIClient, Database, DiscountType, FallbackReconciler, FeeDiscountLinker, ItemKind,
    ItemSource, LineClassifier, LinkKind, MemoryStore, NormalizationMethod, NormalizationStore,
    ParserRegistry, PipelineConfig, ReceiptPipeline, RawLine,
};

fn dec(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn pipeline_with(store: Arc<dyn NormalizationStore>) -> ReceiptPipeline {
    ReceiptPipeline::new(&PipelineConfig::default(), store).expect("Failed to build pipeline")
}

fn pipeline() -> ReceiptPipeline {
    pipeline_with(Arc::new(MemoryStore::new()))
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_ham_and_enviro_fee_scenario() {
    let parse = pipeline().parse_lines("warehouse-chain", &fixtures::HAM_WITH_FEE_LINES);
    assert_eq!(parse.items.len(), 2);

    let ham = &parse.items[0];
    assert_eq!(ham.name, "BLK FRST HAM");
    assert_eq!(ham.price_raw, "143.91");
    assert_eq!(ham.item_code.as_deref(), Some("555107"));
    assert_eq!(ham.kind, ItemKind::Product);

    let fee = &parse.items[1];
    assert_eq!(fee.name, "ENVIRO FEE C");
    assert_eq!(fee.price_raw, "2.00");
    assert_eq!(fee.kind, ItemKind::Fee);
    assert_eq!(fee.preceding_product.as_deref(), Some("BLK FRST HAM"));
}

#[test]
fn test_trailing_minus_with_tax_flag() {
    let price = parse_price("2.00-GP");
    assert_eq!(price.amount, dec(200));
    assert!(price.is_negative);
    assert_eq!(price.original_format, "2.00-GP");
}

#[tokio::test]
async fn test_tpd_discount_is_certain() {
    let pipeline = pipeline();
    let result = pipeline.normalizer().normalize("TPD/1858985", "COSTCO").await;
    assert!(result.is_discount);
    assert_eq!(result.confidence_score, 1.0);
}

#[test]
fn test_price_parsing_is_idempotent() {
    for input in [
        "16.99", "16.99 GP", "2.00-", "2.00-GP", "$16.99", "1,234.50", "-3.00", "(3.00)", "abc", "",
    ] {
        let once = parse_price(input);
        assert_eq!(parse_price(&once.original_format), once, "input {:?}", input);
    }
}

// =============================================================================
// Full receipt workflow
// =============================================================================

#[tokio::test]
async fn test_warehouse_receipt_workflow() {
    let receipt = pipeline().process(&fixtures::warehouse_bundle()).await;

    // Structured extraction found 2 items, raw text shows 4 coded lines
    assert_eq!(receipt.source, ItemSource::LineParser);

    let names: Vec<&str> = receipt.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["BLK FRST HAM", "KS WATER", "ORG BNNS", "RTSSRE CHKN"]);
    assert_eq!(receipt.absorbed_lines, 2);

    let ham = &receipt.items[0];
    assert_eq!(ham.discounts.len(), 1);
    assert_eq!(ham.discounts[0].kind, LinkKind::Fee);
    assert_eq!(ham.discounts[0].link_confidence, 0.9);
    assert_eq!(ham.final_price, dec(14591));

    let water = &receipt.items[1];
    assert_eq!(water.quantity, 2);
    assert_eq!(water.unit_price, Some(dec(499)));
    assert_eq!(water.discounts.len(), 1);
    let tpd = &water.discounts[0];
    assert_eq!(tpd.kind, LinkKind::Discount);
    assert_eq!(tpd.discount_type, DiscountType::Fixed);
    assert_eq!(tpd.discount_amount, dec(300));
    assert_eq!(tpd.link_confidence, 1.0);
    assert_eq!(tpd.applied_to_product_id, Some(water.id));
    assert_eq!(water.final_price, dec(698));

    let chicken = &receipt.items[3];
    assert_eq!(chicken.price, dec(499));
    assert_eq!(chicken.item_code.as_deref(), Some("77777"));

    let summary = &receipt.summary;
    assert_eq!(summary.total_items, 4);
    assert_eq!(summary.product_count, 4);
    assert_eq!(summary.linked_discount_count, 1);
    assert_eq!(summary.linked_fee_count, 1);
    assert_eq!(summary.items_with_discounts, 1);
    assert_eq!(summary.total_discount_amount, dec(300));
    assert_eq!(summary.total_fee_amount, dec(200));
}

#[tokio::test]
async fn test_supermarket_receipt_keeps_structured_items() {
    let receipt = pipeline().process(&fixtures::supermarket_bundle()).await;
    assert_eq!(receipt.source, ItemSource::Structured);

    let names: Vec<&str> = receipt.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["ORGANIC BANANAS", "MILK 2% GAL"]);
    assert_eq!(receipt.absorbed_lines, 2);

    let milk = &receipt.items[1];
    let kinds: Vec<LinkKind> = milk.discounts.iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![LinkKind::Discount, LinkKind::Fee]);
    assert_eq!(milk.final_price, dec(339));

    // Fees never count toward the discount total
    assert_eq!(receipt.summary.total_discount_amount, dec(100));
    assert_eq!(receipt.summary.total_fee_amount, dec(10));
}

// =============================================================================
// Invariants
// =============================================================================

#[test]
fn test_consumed_price_lines_are_disjoint() {
    let parse = pipeline().parse_lines("COSTCO", &fixtures::WAREHOUSE_RECEIPT_LINES);

    let price_lines: Vec<usize> = parse.items.iter().filter_map(|i| i.price_line).collect();
    let unique: BTreeSet<usize> = price_lines.iter().copied().collect();
    assert_eq!(price_lines.len(), unique.len());
    assert!(!price_lines.is_empty());
}

#[test]
fn test_discovered_fee_sits_between_its_product_and_the_next() {
    let config = PipelineConfig::default();
    let classifier = LineClassifier::new(Arc::new(config.pattern_bank().unwrap()));
    let registry = Arc::new(
        ParserRegistry::new(classifier.clone(), &config.parser, config.merchants.clone()).unwrap(),
    );
    let reconciler = FallbackReconciler::new(classifier.clone(), registry);
    let linker = FeeDiscountLinker::new(classifier, &config.parser);

    let bundle = fixtures::supermarket_bundle();
    let lines = RawLine::from_texts(&bundle.raw_text);
    let reconciliation = reconciler.reconcile(&bundle.merchant, &bundle.items, &lines);
    let linked = linker.link(reconciliation.items, &lines, &reconciliation.consumed);

    let names: Vec<&str> = linked.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["ORGANIC BANANAS", "MILK 2% GAL", "COUPON MILK", "CRV FEE"]);

    let fee_at = names.iter().position(|n| *n == "CRV FEE").unwrap();
    let product_at = names.iter().position(|n| *n == "MILK 2% GAL").unwrap();
    assert!(fee_at > product_at);
    assert!(linked[product_at + 1..fee_at]
        .iter()
        .all(|item| item.kind.is_modifier()));
    assert_eq!(linked[fee_at].preceding_product.as_deref(), Some("MILK 2% GAL"));
    assert_eq!(linked[fee_at].price_raw, "0.10");
}

#[tokio::test]
async fn test_visible_plus_absorbed_equals_linked_items() {
    let pipeline = pipeline();
    let bundle = fixtures::warehouse_bundle();

    let linked = pipeline.parse_lines(&bundle.merchant, &bundle.raw_text);
    let receipt = pipeline.process(&bundle).await;
    assert_eq!(receipt.items.len() + receipt.absorbed_lines, linked.items.len());
}

#[tokio::test]
async fn test_generic_merged_fee_line_keeps_its_product() {
    let bundle = fixtures::bundle("Corner Deli", Vec::new(), &["MILK 3.49", "KS WATER CRV 5.00"]);
    let receipt = pipeline().process(&bundle).await;

    let names: Vec<&str> = receipt.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["MILK", "KS WATER CRV"]);
    assert!(receipt.items.iter().all(|i| i.kind == ItemKind::Product));
    assert_eq!(receipt.absorbed_lines, 0);
    assert_eq!(receipt.items[0].final_price, dec(349));
    assert_eq!(receipt.items[1].final_price, dec(500));
}

#[tokio::test]
async fn test_confidence_bounds() {
    let receipt = pipeline().process(&fixtures::warehouse_bundle()).await;
    for item in &receipt.items {
        let confidence = item.normalization.confidence_score;
        assert!((0.0..=1.0).contains(&confidence), "{} has {}", item.name, confidence);
        if item.normalization.is_discount || item.normalization.is_adjustment {
            assert_eq!(confidence, 1.0);
        }
        for link in &item.discounts {
            assert!((0.5..=1.0).contains(&link.link_confidence));
        }
    }
}

// =============================================================================
// Collaborators
// =============================================================================

#[tokio::test]
async fn test_ai_backend_over_http() {
    let server = MockOllamaServer::start().await;
    let pipeline = pipeline().with_ai(AIClient::ollama(&server.url(), "llama3.2"));

    let receipt = pipeline.process(&fixtures::warehouse_bundle()).await;
    let ham = &receipt.items[0].normalization;
    assert_eq!(ham.method, NormalizationMethod::AiGenerated);
    assert_eq!(ham.normalized_name, "Black Forest Ham");
    assert_eq!(ham.category.as_deref(), Some("Meat"));

    let bananas = &receipt.items[2].normalization;
    assert_eq!(bananas.normalized_name, "Organic Bananas");
    assert!(bananas.brand.is_none());
}

#[tokio::test]
async fn test_sqlite_store_learns_across_receipts() {
    let db = Arc::new(Database::in_memory().expect("Failed to create in-memory database"));
    let pipeline = pipeline_with(db.clone());

    let first = pipeline.process(&fixtures::warehouse_bundle()).await;
    assert_ne!(first.items[0].normalization.method, NormalizationMethod::ExactMatch);

    let second = pipeline.process(&fixtures::warehouse_bundle()).await;
    let ham = &second.items[0].normalization;
    assert_eq!(ham.method, NormalizationMethod::ExactMatch);
    assert_eq!(ham.normalized_name, first.items[0].normalization.normalized_name);

    let record = db
        .get_normalization("BLK FRST HAM", "COSTCO WHOLESALE #481")
        .unwrap()
        .expect("ham should be learned");
    assert_eq!(record.match_count, 2);
}
