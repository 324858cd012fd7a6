//! Finite State report CLI binary.
//!
//! Exit status: 0 for complete results, 2 when some asset versions could
//! not be fetched, 1 on fatal errors.

use std::process::ExitCode;

use clap::Parser;
use finite_state_sdk::cli::{Cli, Command};
use finite_state_sdk::output::{records_table, severity_breakdown, severity_rank};
use finite_state_sdk::{
    fetch_findings_per_asset_version, get_findings_count, ApiEndpoints, Assembler, Asset,
    AssetListQuery, AssetVersion, AssetVersionListQuery, BusinessUnit, Credentials,
    FailurePolicy, FetchOptions, FetchResultSet, Finding, FindingListQuery, FiniteStateClient,
    FiniteStateError, List, Project, ProjectListQuery, SbomSearch, Schema, SearchMethod,
    SoftwareComponent, SoftwareComponentListQuery, User,
};
use serde_json::Value;
use tabled::Table;
use tracing_subscriber::EnvFilter;

const EXIT_PARTIAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let loaded = match &cli.secrets_file {
        Some(path) => dotenvy::from_path(path).map(|_| ()),
        None => dotenvy::dotenv().map(|_| ()),
    };
    if let Err(e) = loaded {
        if cli.secrets_file.is_some() {
            eprintln!("Error: could not read secrets file: {e}");
            return ExitCode::FAILURE;
        }
        tracing::debug!(error = %e, "no .env file loaded");
    }

    let client = match &cli.token_cache {
        Some(dir) => Credentials::from_env().and_then(|credentials| {
            FiniteStateClient::new_cached(credentials, &ApiEndpoints::from_env(), dir)
        }),
        None => FiniteStateClient::from_env(),
    };
    let client = match client {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Hint: Set CLIENT_ID, CLIENT_SECRET and ORGANIZATION_CONTEXT or pass --secrets-file");
            return ExitCode::FAILURE;
        }
    };

    match run(&client, cli).await {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::Partial(failed)) => {
            eprintln!("Warning: results are incomplete; failed: {}", failed.join(", "));
            ExitCode::from(EXIT_PARTIAL)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

enum Outcome {
    Complete,
    Partial(Vec<String>),
}

async fn run(client: &FiniteStateClient, cli: Cli) -> finite_state_sdk::Result<Outcome> {
    let json = cli.json;
    match cli.command {
        Command::AssetVersions {
            asset,
            business_unit,
        } => {
            let options = cli.fetch.to_options(FailurePolicy::FailFast);
            let query = AssetVersionListQuery {
                asset_id: asset,
                business_unit_id: business_unit,
                ..Default::default()
            };
            let raw = collect(client, AssetVersion::endpoint(&query), &options).await?;
            print_records(
                &Schema::asset_versions(),
                raw,
                &["asset_name", "name", "group", "risk_score", "created_at"],
                json,
            )?;
        }
        Command::Findings {
            asset_version,
            severity,
            category,
            limit,
            count,
        } => {
            let mut options = cli.fetch.to_options(FailurePolicy::FailFast);
            options.max_records = limit;
            let mut query = FindingListQuery::for_asset_version(asset_version);
            query.severity = severity;
            if let Some(category) = category {
                query = query.with_category(category);
            }

            if count {
                let total = get_findings_count(client, &query).await?;
                if json {
                    println!("{}", serde_json::json!({ "count": total }));
                } else {
                    println!("{total}");
                }
                return Ok(Outcome::Complete);
            }

            let raw = collect(client, Finding::endpoint(&query), &options).await?;
            let mut assembled = Assembler::normalize(&Schema::findings(), [raw]);
            assembled.records.sort_by_key(|r| {
                r.text("severity").map(severity_rank).unwrap_or(usize::MAX)
            });
            if json {
                println!("{}", serde_json::to_string_pretty(&assembled.records)?);
            } else {
                println!(
                    "{}",
                    records_table(
                        &assembled.records,
                        &["severity", "risk_score", "category", "title", "status"]
                    )
                );
            }
        }
        Command::RiskScores { business_unit, top } => {
            let options = cli.fetch.to_options(FailurePolicy::FailFast);
            let query = AssetVersionListQuery {
                business_unit_id: business_unit,
                ..Default::default()
            };
            let raw = collect(client, AssetVersion::endpoint(&query), &options).await?;
            let mut assembled = Assembler::normalize(&Schema::asset_versions(), [raw]);
            assembled.records.sort_by(|a, b| {
                let a = a.number("risk_score").unwrap_or(f64::MIN);
                let b = b.number("risk_score").unwrap_or(f64::MIN);
                b.total_cmp(&a)
            });
            if let Some(top) = top {
                assembled.records.truncate(top);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&assembled.records)?);
            } else {
                println!(
                    "{}",
                    records_table(&assembled.records, &["risk_score", "asset_name", "name", "group"])
                );
            }
        }
        Command::FindingsOverTime {
            asset,
            category,
            fail_fast,
        } => {
            let policy = if fail_fast {
                FailurePolicy::FailFast
            } else {
                FailurePolicy::BestEffort
            };
            let options = cli.fetch.to_options(policy);
            let versions = AssetVersion::list_all(
                client,
                &AssetVersionListQuery {
                    asset_id: asset,
                    ..Default::default()
                },
            )
            .await?;
            tracing::info!(versions = versions.len(), "fetching findings per asset version");

            let mut query = FindingListQuery::default();
            if let Some(category) = category {
                query = query.with_category(category);
            }
            let results = fetch_findings_per_asset_version(
                client,
                versions.into_iter().map(|v| v.id),
                query,
                &options,
            )
            .await?;
            print_breakdown(&results, json)?;
            if results.is_partial() {
                return Ok(Outcome::Partial(results.failed_ids()));
            }
        }
        Command::Components {
            asset_version,
            component_type,
        } => {
            let options = cli.fetch.to_options(FailurePolicy::FailFast);
            let query = SoftwareComponentListQuery {
                asset_version_id: Some(asset_version),
                component_type,
            };
            let raw = collect(client, SoftwareComponent::endpoint(&query), &options).await?;
            print_records(
                &Schema::software_components(),
                raw,
                &["name", "version", "type", "licenses", "risk_score"],
                json,
            )?;
        }
        Command::SearchSbom {
            name,
            version,
            asset_version,
            contains,
            case_sensitive,
        } => {
            let options = cli.fetch.to_options(FailurePolicy::FailFast);
            let search = SbomSearch {
                name,
                version,
                asset_version_id: asset_version,
                method: if contains {
                    SearchMethod::Contains
                } else {
                    SearchMethod::Exact
                },
                case_sensitive,
            };
            search.validate()?;
            let raw = collect(client, search.endpoint(), &options).await?;
            print_records(
                &Schema::sbom_matches(),
                raw,
                &["name", "version", "asset", "asset_version"],
                json,
            )?;
        }
        Command::Assets { business_unit } => {
            let options = cli.fetch.to_options(FailurePolicy::FailFast);
            let query = AssetListQuery {
                business_unit_id: business_unit,
                ..Default::default()
            };
            let raw = collect(client, Asset::endpoint(&query), &options).await?;
            print_records(&Schema::assets(), raw, &["name", "group", "versions"], json)?;
        }
        Command::BusinessUnits => {
            let options = cli.fetch.to_options(FailurePolicy::FailFast);
            let raw = collect(client, BusinessUnit::endpoint(&()), &options).await?;
            print_records(&Schema::business_units(), raw, &["name"], json)?;
        }
        Command::Users => {
            let options = cli.fetch.to_options(FailurePolicy::FailFast);
            let raw = collect(client, User::endpoint(&()), &options).await?;
            print_records(&Schema::users(), raw, &["email"], json)?;
        }
        Command::Projects => {
            let options = cli.fetch.to_options(FailurePolicy::FailFast);
            let raw = collect(client, Project::endpoint(&ProjectListQuery::default()), &options).await?;
            print_records(&Schema::projects(), raw, &["name", "type", "default_branch"], json)?;
        }
    }
    Ok(Outcome::Complete)
}

async fn collect(
    client: &FiniteStateClient,
    endpoint: finite_state_sdk::ListEndpoint,
    options: &FetchOptions,
) -> finite_state_sdk::Result<Vec<Value>> {
    options.validate()?;
    let raw = client.paginate_with(endpoint, options).collect_all().await?;
    Ok(raw)
}

fn print_records(
    schema: &Schema,
    raw: Vec<Value>,
    columns: &[&str],
    json: bool,
) -> finite_state_sdk::Result<()> {
    let assembled = Assembler::normalize(schema, [raw]);
    if json {
        println!("{}", serde_json::to_string_pretty(&assembled.records)?);
    } else {
        println!("{}", records_table(&assembled.records, columns));
        println!("\n{} {}(s)", assembled.records.len(), schema.kind);
    }
    Ok(())
}

fn print_breakdown(results: &FetchResultSet, json: bool) -> Result<(), FiniteStateError> {
    let rows = severity_breakdown(results);
    if json {
        let body = serde_json::json!({
            "asset_versions": rows.iter().map(|r| serde_json::json!({
                "asset_version": r.asset_version,
                "total": r.total,
                "critical": r.critical,
                "high": r.high,
                "medium": r.medium,
                "low": r.low,
                "other": r.other,
            })).collect::<Vec<_>>(),
            "failed": results.failed,
            "timed_out": results.timed_out,
            "partial": results.is_partial(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{}", Table::new(rows));
        if !results.conflicts.is_empty() {
            println!("\n{} conflicting duplicate(s) dropped", results.conflicts.len());
        }
    }
    Ok(())
}
