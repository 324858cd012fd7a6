//! GraphQL documents used by the typed entity API.
//!
//! Every list document takes `$filter`, `$after` and `$first` so it can be
//! driven by a [`crate::Paginator`].

/// Asset versions with their asset and group.
pub const ALL_ASSET_VERSIONS: &str = r#"
query GetAllAssetVersions(
    $filter: AssetVersionFilter!,
    $after: String,
    $first: Int
) {
    allAssetVersions(filter: $filter, after: $after, first: $first) {
        _cursor
        id
        createdAt
        createdBy { id email }
        name
        relativeRiskScore
        uniqueTestTypes { id name }
        testStatuses
        asset {
            id
            name
            group { id name }
        }
    }
}
"#;

/// Findings with status, CVE and CWE details.
pub const ALL_FINDINGS: &str = r#"
query GetFindings(
    $filter: FindingFilter,
    $after: String,
    $first: Int,
    $orderBy: [FindingOrderBy!]
) {
    allFindings(filter: $filter, after: $after, first: $first, orderBy: $orderBy) {
        _cursor
        id
        title
        date
        createdAt
        updatedAt
        vulnIdFromTool
        description
        severity
        riskScore
        affects { id name version }
        sourceTypes
        category
        subcategory
        regression
        currentStatus {
            id
            comment
            justification
            status
            createdAt
            updatedAt
            createdBy { id email }
        }
        cwes { id cweId name }
        cves {
            id
            cveId
            epss { epssPercentile epssScore }
            exploitsInfo {
                exploitProofOfConcept
                reportedInTheWild
                weaponized
                exploitedByNamedThreatActors
                exploitedByBotnets
                exploitedByRansomware
            }
        }
        origin
        originalFindingsSources { id name }
        test { id tools { id name } }
    }
}
"#;

/// Finding count for a filter.
pub const FINDINGS_COUNT: &str = r#"
query GetFindingsCount($filter: FindingFilter) {
    _allFindingsMeta(filter: $filter) {
        count
    }
}
"#;

/// Software component instances of an asset version.
pub const ALL_SOFTWARE_COMPONENTS: &str = r#"
query GetSoftwareComponents(
    $filter: SoftwareComponentInstanceFilter,
    $after: String,
    $first: Int,
    $orderBy: [SoftwareComponentInstanceOrderBy!]
) {
    allSoftwareComponentInstances(filter: $filter, after: $after, first: $first, orderBy: $orderBy) {
        _cursor
        id
        name
        type
        version
        hashes { alg content }
        licenses { id name copyLeft isFsfLibre isOsiApproved url }
        softwareIdentifiers { cpes purl }
        absoluteRiskScore
        currentStatus { id status comment }
    }
}
"#;

/// Products.
pub const ALL_PRODUCTS: &str = r#"
query GetAllProducts(
    $filter: ProductFilter!,
    $after: String,
    $first: Int
) {
    allProducts(filter: $filter, after: $after, first: $first) {
        _cursor
        id
        name
        createdAt
    }
}
"#;

/// Assets with their business unit and versions.
pub const ALL_ASSETS: &str = r#"
query GetAllAssets(
    $filter: AssetFilter!,
    $after: String,
    $first: Int
) {
    allAssets(filter: $filter, after: $after, first: $first) {
        _cursor
        id
        name
        createdAt
        createdBy { id email }
        group { id name }
        ctx { asset businessUnits products }
        versions { id name relativeRiskScore testStatuses }
    }
}
"#;

/// Business units (the platform calls them groups).
pub const ALL_BUSINESS_UNITS: &str = r#"
query GetBusinessUnits($after: String, $first: Int) {
    allGroups(after: $after, first: $first) {
        _cursor
        id
        name
    }
}
"#;

/// Users of the organization.
pub const ALL_USERS: &str = r#"
query GetUsers($after: String, $first: Int) {
    allUsers(after: $after, first: $first) {
        _cursor
        id
        email
    }
}
"#;

/// One product with the asset versions it ships.
pub const PRODUCT_ASSET_VERSIONS: &str = r#"
query GetProductAssetVersions(
    $filter: ProductFilter!,
    $after: String,
    $first: Int
) {
    allProducts(filter: $filter, after: $after, first: $first) {
        _cursor
        id
        name
        createdAt
        assets {
            id
            name
            relativeRiskScore
            asset { id name }
        }
    }
}
"#;

/// Component search across the organization, with the owning asset version.
pub const SEARCH_SBOM: &str = r#"
query SearchSbom(
    $filter: SoftwareComponentInstanceFilter,
    $after: String,
    $first: Int
) {
    allSoftwareComponentInstances(filter: $filter, after: $after, first: $first) {
        _cursor
        id
        name
        version
        assetVersion {
            id
            name
            asset { id name }
        }
    }
}
"#;

/// Component search within one asset version, with merged originals.
pub const SEARCH_SBOM_IN_ASSET_VERSION: &str = r#"
query SearchSbomInAssetVersion(
    $filter: SoftwareComponentInstanceFilter,
    $after: String,
    $first: Int
) {
    allSoftwareComponentInstances(filter: $filter, after: $after, first: $first) {
        _cursor
        id
        name
        version
        originalComponents { id name version }
    }
}
"#;
