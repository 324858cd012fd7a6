//! Basic example demonstrating the Finite State client.
//!
//! Run with:
//! ```
//! CLIENT_ID=... CLIENT_SECRET=... ORGANIZATION_CONTEXT=... cargo run --example basic
//! ```

use finite_state_sdk::{
    get_findings_count, AssetVersion, FindingListQuery, FiniteStateClient, Finding, Get, List,
};

#[tokio::main]
async fn main() -> finite_state_sdk::Result<()> {
    // Initialize tracing for debugging (optional)
    tracing_subscriber::fmt::init();

    println!("Creating Finite State client...");
    let client = FiniteStateClient::from_env()?;

    // First page of asset versions
    println!("\n--- Listing Asset Versions (first page) ---");
    let mut pages = AssetVersion::paginator(&client, &Default::default());
    let Some(page) = AssetVersion::next_page(&mut pages).await? else {
        println!("No asset versions found");
        return Ok(());
    };
    println!("Found {} asset versions (more: {})", page.len(), page.has_more);
    for version in &page {
        println!("  - {} ({})", version.label(), version.id);
    }

    if let Some(first) = page.items.first() {
        println!("\n--- Asset Version Details ---");
        let version = AssetVersion::get(&client, first.id.clone()).await?;
        println!("Version: {}", version.label());
        println!("  Risk score: {:?}", version.relative_risk_score);
        println!("  Business unit: {}", version.business_unit().unwrap_or("none"));

        let query = FindingListQuery::for_asset_version(&version.id).with_category("CVE");
        let count = get_findings_count(&client, &query).await?;
        println!("\n--- CVE Findings ({count}) ---");

        let findings = Finding::list_limited(&client, &query, 5).await?;
        for finding in &findings {
            println!(
                "  [{}] {} {}",
                finding.severity.as_deref().unwrap_or("?"),
                finding.title.as_deref().unwrap_or(""),
                finding.cve_ids().join(", ")
            );
        }
    }

    Ok(())
}
