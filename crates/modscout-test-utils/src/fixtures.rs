//! Canned registry records for engine tests.

use std::collections::BTreeSet;

use modscout_core::reference::ModuleReference;
use modscout_core::registry::{
    ModuleDetail, ModuleInput, ModuleOutput, ModuleSummary, ProviderRequirement,
};

/// Parse a reference or panic; fixtures are always well-formed.
pub fn reference(id: &str) -> ModuleReference {
    ModuleReference::parse(id).unwrap_or_else(|e| panic!("fixture reference {id:?}: {e}"))
}

/// A pinned module detail with one required and one optional input.
pub fn detail(id: &str, source_url: &str) -> ModuleDetail {
    let reference = reference(id);
    ModuleDetail {
        description: format!("{} module", reference.name()),
        source_url: source_url.to_string(),
        published_at: Some("2024-05-01T12:00:00Z".to_string()),
        inputs: vec![
            ModuleInput {
                name: "resource_group_id".to_string(),
                type_name: "string".to_string(),
                description: Some("ID of the resource group".to_string()),
                default: None,
                required: true,
            },
            ModuleInput {
                name: "tags".to_string(),
                type_name: "list(string)".to_string(),
                description: None,
                default: Some(serde_json::json!([])),
                required: false,
            },
        ],
        outputs: vec![ModuleOutput {
            name: "id".to_string(),
            description: Some("Resource ID".to_string()),
        }],
        providers: BTreeSet::from([ProviderRequirement {
            name: "ibm".to_string(),
            namespace: "ibm-cloud".to_string(),
            version_constraint: Some(">= 1.60.0".to_string()),
        }]),
        dependencies: Vec::new(),
        submodules: Vec::new(),
        examples: Vec::new(),
        reference,
    }
}

/// A search hit with a description mentioning the module name.
pub fn summary(id: &str) -> ModuleSummary {
    let reference = reference(id);
    ModuleSummary {
        description: format!("Provision {} resources", reference.name()),
        downloads: 1000,
        verified: true,
        source_url: None,
        published_at: None,
        reference,
    }
}

/// A small module repository with two examples and one submodule.
pub fn module_tree() -> Vec<(&'static str, &'static str)> {
    vec![
        ("README.md", "# VPC\n\nCreates a VPC with subnets.\n"),
        ("main.tf", "resource \"ibm_is_vpc\" \"vpc\" {}\n"),
        ("variables.tf", "variable \"resource_group_id\" {}\n"),
        ("outputs.tf", "output \"id\" {}\n"),
        ("examples/basic/README.md", "# Basic\n\nMinimal VPC.\n"),
        ("examples/basic/main.tf", "module \"vpc\" {}\n"),
        ("examples/basic/main_test.go", "package test\n"),
        ("examples/complete/main.tf", "module \"vpc\" { tags = [] }\n"),
        ("modules/flow-logs/README.md", "Flow log collector.\n"),
        ("modules/flow-logs/main.tf", "resource \"ibm_is_flow_log\" \"f\" {}\n"),
        ("tests/pr_test.go", "package test\n"),
    ]
}
