//! Test data fixtures for the mock server.
//!
//! Provides factory functions for creating realistic platform records.

use serde_json::{json, Value};

use super::state::MockState;

/// Collection of fixture factories for test data.
pub struct Fixtures;

impl Fixtures {
    /// Create an asset version record.
    pub fn asset_version(id: &str, asset: &str, name: &str, risk: f64) -> Value {
        json!({
            "id": id,
            "name": name,
            "createdAt": "2024-06-01T12:00:00Z",
            "createdBy": {"id": "u-1", "email": "ci@example.com"},
            "relativeRiskScore": risk,
            "uniqueTestTypes": [{"id": "tt-1", "name": "firmware"}],
            "testStatuses": ["COMPLETED"],
            "asset": {
                "id": format!("asset-{asset}"),
                "name": asset,
                "group": {"id": "bu-1", "name": "Devices"}
            }
        })
    }

    /// Create a finding record.
    pub fn finding(id: &str, severity: &str, category: &str) -> Value {
        let cve = format!("CVE-2024-{}", id.rsplit('-').next().unwrap_or(id));
        json!({
            "id": id,
            "title": format!("{cve} in libexample"),
            "createdAt": "2024-06-02T08:00:00Z",
            "severity": severity,
            "riskScore": 5.0,
            "category": category,
            "affects": [{"id": "sc-1", "name": "libexample", "version": "1.0.0"}],
            "currentStatus": {"id": format!("st-{id}"), "status": "AFFECTED"},
            "cves": [{"id": format!("cve-{id}"), "cveId": cve}],
            "cwes": [],
            "regression": false
        })
    }

    /// Create `count` findings named `{prefix}-0001`, `{prefix}-0002`, ...
    pub fn findings(prefix: &str, count: usize) -> Vec<Value> {
        const SEVERITIES: [&str; 4] = ["CRITICAL", "HIGH", "MEDIUM", "LOW"];
        (1..=count)
            .map(|n| Self::finding(&format!("{prefix}-{n:04}"), SEVERITIES[n % 4], "CVE"))
            .collect()
    }

    /// Create a software component instance record.
    pub fn component(id: &str, name: &str, version: &str, license: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "type": "LIBRARY",
            "version": version,
            "hashes": [],
            "licenses": [{"id": format!("lic-{license}"), "name": license}],
            "softwareIdentifiers": {"cpes": [], "purl": format!("pkg:generic/{name}@{version}")},
            "absoluteRiskScore": 3.5,
            "currentStatus": null
        })
    }

    /// Create a product record listing the given asset versions.
    pub fn product(id: &str, name: &str, asset_versions: &[Value]) -> Value {
        let assets: Vec<Value> = asset_versions
            .iter()
            .map(|av| {
                json!({
                    "id": av["id"],
                    "name": av["name"],
                    "relativeRiskScore": av["relativeRiskScore"],
                    "asset": {"id": av["asset"]["id"], "name": av["asset"]["name"]}
                })
            })
            .collect();
        json!({"id": id, "name": name, "createdAt": "2023-01-15T00:00:00Z", "assets": assets})
    }

    /// Create an asset record in a business unit.
    pub fn asset(name: &str, group: (&str, &str), versions: &[Value]) -> Value {
        let id = format!("asset-{name}");
        let versions: Vec<Value> = versions
            .iter()
            .map(|av| {
                json!({
                    "id": av["id"],
                    "name": av["name"],
                    "relativeRiskScore": av["relativeRiskScore"],
                    "testStatuses": av["testStatuses"]
                })
            })
            .collect();
        json!({
            "id": id,
            "name": name,
            "createdAt": "2024-05-20T09:30:00Z",
            "createdBy": {"id": "u-1", "email": "ci@example.com"},
            "group": {"id": group.0, "name": group.1},
            "ctx": {"asset": id, "businessUnits": [group.0], "products": []},
            "versions": versions
        })
    }

    /// Create a business unit record.
    pub fn business_unit(id: &str, name: &str) -> Value {
        json!({"id": id, "name": name, "__typename": "Group"})
    }

    /// Create a user record.
    pub fn user(id: &str, email: &str) -> Value {
        json!({"id": id, "email": email, "__typename": "User"})
    }

    /// Create a REST project record.
    pub fn project(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "type": "firmware",
            "defaultBranch": {
                "id": format!("{id}-main"),
                "name": "main",
                "latestVersion": {"id": format!("{id}-v1"), "name": "1.0.0"}
            }
        })
    }

    /// Create the default scenario.
    pub fn default_scenario() -> MockState {
        let gateway = [
            Self::asset_version("av-1", "gateway", "1.0.0", 61.0),
            Self::asset_version("av-2", "gateway", "1.1.0", 48.5),
        ];
        let mut camera = Self::asset_version("av-3", "camera", "0.9.2", 77.25);
        camera["asset"]["group"] = json!({"id": "bu-2", "name": "Cameras"});

        let mut state = MockState::new()
            .with_asset_version(gateway[0].clone())
            .with_asset_version(gateway[1].clone())
            .with_asset_version(camera.clone())
            .with_findings("av-1", Self::findings("av1-f", 7))
            .with_findings("av-2", Self::findings("av2-f", 3))
            .with_component("av-1", Self::component("sc-1", "busybox", "1.36.0", "GPL-2.0-only"))
            .with_component("av-1", Self::component("sc-2", "openssl", "3.0.8", "Apache-2.0"))
            .with_component("av-3", Self::component("sc-3", "OpenSSL", "1.1.1w", "OpenSSL"))
            .with_component("av-3", Self::component("sc-4", "openssl-fips", "3.0.8", "Apache-2.0"))
            .with_product(Self::product("p-1", "Gateway", &gateway))
            .with_product(Self::product("p-2", "Camera", std::slice::from_ref(&camera)))
            .with_asset(Self::asset("gateway", ("bu-1", "Devices"), &gateway))
            .with_asset(Self::asset("camera", ("bu-2", "Cameras"), std::slice::from_ref(&camera)))
            .with_business_unit(Self::business_unit("bu-1", "Devices"))
            .with_business_unit(Self::business_unit("bu-2", "Cameras"))
            .with_user(Self::user("u-1", "ci@example.com"))
            .with_user(Self::user("u-2", "analyst@example.com"));

        for n in 1..=5 {
            state = state.with_project(Self::project(&format!("proj-{n}"), &format!("project-{n}")));
        }
        state
    }
}
