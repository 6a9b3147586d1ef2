//! Resolver behavior: principal mapping, domain construction, allow/deny

use garm_authz::{AccessRule, PlatformHooks, PlatformRules, RequestFields, Resolver};
use proptest::prelude::*;
use std::borrow::Cow;
use std::sync::Arc;

const SA_GROUPS: &[&str] = &["system:authenticated", "system:serviceaccounts"];

fn groups(list: &[&str]) -> Vec<String> {
    list.iter().map(|g| g.to_string()).collect()
}

fn resolver(rules: PlatformRules) -> Resolver {
    Resolver::with_lookup(rules, |_| None).unwrap()
}

fn get_pods() -> RequestFields<'static> {
    RequestFields::new("get", "ns", "", "pods", "web")
}

// ============================================================================
// PRINCIPAL MAPPING
// ============================================================================

#[test]
fn test_service_account_with_empty_namespace_part() {
    let resolver = resolver(PlatformRules {
        service_account_prefixes: vec!["prefix-344".to_string()],
        service_account_domain_prefix: "athenz-|._namespace_||._namespace_|-domain-342".to_string(),
        ..Default::default()
    });

    assert_eq!(
        resolver.principal_from_user("prefix-344::part-1:user-349:", &groups(SA_GROUPS)),
        "athenz-||||-domain-342.part-1.user-349"
    );
}

#[test]
fn test_service_account_with_namespace() {
    let resolver = resolver(PlatformRules {
        service_account_prefixes: vec!["prefix-358".to_string()],
        service_account_domain_prefix: "athenz-|._namespace_||._namespace_|-domain-356".to_string(),
        ..Default::default()
    });

    assert_eq!(
        resolver.principal_from_user("prefix-358:ns-361:part-1:user-361:", &groups(SA_GROUPS)),
        "athenz-|.ns-361||.ns-361|-domain-356.part-1.user-361"
    );
}

#[test]
fn test_service_account_single_part_uses_literal_prefix() {
    let resolver = resolver(PlatformRules {
        service_account_prefixes: vec!["prefix-319".to_string()],
        ..Default::default()
    });

    assert_eq!(
        resolver.principal_from_user("prefix-319:user-323", &groups(SA_GROUPS)),
        "user-323"
    );
}

#[test]
fn test_service_account_prefix_requires_group() {
    let resolver = resolver(PlatformRules {
        service_account_prefixes: vec!["system:serviceaccount".to_string()],
        service_account_domain_prefix: "sa._namespace_".to_string(),
        user_prefix: "user.".to_string(),
        ..Default::default()
    });

    let identity = "system:serviceaccount:ns:builder";
    assert_eq!(
        resolver.principal_from_user(identity, &groups(SA_GROUPS)),
        "sa.ns.builder"
    );
    assert_eq!(
        resolver.principal_from_user(identity, &groups(&["system:authenticated"])),
        "user.system:serviceaccount:ns:builder"
    );
}

#[test]
fn test_empty_service_account_prefix_is_skipped() {
    let resolver = resolver(PlatformRules {
        service_account_prefixes: vec![String::new()],
        user_prefix: "user-prefix.".to_string(),
        ..Default::default()
    });

    assert_eq!(
        resolver.principal_from_user(":user-373:", &groups(SA_GROUPS)),
        "user-prefix.:user-373:"
    );
}

#[test]
fn test_qualified_identity_unchanged() {
    let resolver = resolver(PlatformRules {
        user_prefix: "user.".to_string(),
        ..Default::default()
    });

    assert_eq!(resolver.principal_from_user("domain.service", &[]), "domain.service");
    assert_eq!(resolver.principal_from_user("alice", &[]), "user.alice");
}

/// Strips a cloud IAM prefix from cluster identities
#[derive(Debug)]
struct IamHooks;

impl PlatformHooks for IamHooks {
    fn map_identity<'a>(&self, identity: &'a str) -> Cow<'a, str> {
        match identity.strip_prefix("iam:") {
            Some(rest) => Cow::Owned(rest.replace('/', ".")),
            None => Cow::Borrowed(identity),
        }
    }
}

#[test]
fn test_custom_hooks_rewrite_identity_before_mapping() {
    let resolver = resolver(PlatformRules {
        user_prefix: "user.".to_string(),
        ..Default::default()
    })
    .with_hooks(Arc::new(IamHooks));

    assert_eq!(resolver.principal_from_user("iam:team/deployer", &[]), "team.deployer");
    assert_eq!(resolver.principal_from_user("iam:alice", &[]), "user.alice");
    assert_eq!(resolver.principal_from_user("bob", &[]), "user.bob");
}

#[test]
fn test_custom_hooks_apply_to_service_accounts() {
    let resolver = resolver(PlatformRules {
        service_account_prefixes: vec!["system:serviceaccount:".to_string()],
        service_account_domain_prefix: "cluster._namespace_".to_string(),
        ..Default::default()
    })
    .with_hooks(Arc::new(IamHooks));

    assert_eq!(
        resolver.principal_from_user("iam:system:serviceaccount:ns:web", &groups(SA_GROUPS)),
        "cluster.ns.web"
    );
}

// ============================================================================
// DOMAIN CONSTRUCTION
// ============================================================================

#[test]
fn test_domains_resolve_environment_once() {
    let rules = PlatformRules {
        service_domains: vec![
            "_CLUSTER_._namespace_".to_string(),
            "shared._namespace_".to_string(),
        ],
        ..Default::default()
    };
    let resolver = Resolver::with_lookup(rules, |name| {
        (name == "CLUSTER").then(|| "prod".to_string())
    })
    .unwrap();

    assert_eq!(
        resolver.domain_templates(),
        &["prod._namespace_".to_string(), "shared._namespace_".to_string()]
    );
    assert_eq!(
        resolver.build_domains_from_namespace("team/a..b"),
        vec!["prod.team.a-b".to_string(), "shared.team.a-b".to_string()]
    );
    assert_eq!(
        resolver.build_domains_from_namespace(""),
        vec!["prod".to_string(), "shared".to_string()]
    );
}

#[test]
fn test_admin_domain_substitutes_unconditionally() {
    let resolver = resolver(PlatformRules {
        admin_domain: "admin._namespace_".to_string(),
        ..Default::default()
    });

    assert_eq!(resolver.admin_domain("team"), "admin.team");
    // the placeholder is replaced by the empty namespace, leaving a dot to trim
    assert_eq!(resolver.admin_domain(""), "admin");
}

// ============================================================================
// FIELD MAPPING
// ============================================================================

#[test]
fn test_field_mappers() {
    let resolver = resolver(PlatformRules {
        verb_mappings: [("get".to_string(), "read".to_string())].into(),
        resource_mappings: [("pods".to_string(), "pod".to_string())].into(),
        api_group_control_enabled: true,
        api_group_mappings: [("apps".to_string(), "app".to_string())].into(),
        resource_name_control_enabled: true,
        resource_name_mappings: [("web".to_string(), "frontend:v1".to_string())].into(),
        resource_name_replacer: [(":".to_string(), "_".to_string())].into(),
        ..Default::default()
    });

    assert_eq!(resolver.map_verb_action("get"), "read");
    assert_eq!(resolver.map_verb_action("list"), "list");
    assert_eq!(resolver.map_resource("pods"), "pod");
    assert_eq!(resolver.map_api_group("apps"), "app");
    assert_eq!(resolver.map_api_group("batch"), "batch");
    assert_eq!(resolver.map_resource_name("web"), "frontend_v1");
}

#[test]
fn test_disabled_controls_blank_fields() {
    let resolver = resolver(PlatformRules::default());
    assert_eq!(resolver.map_api_group("apps"), "");
    assert_eq!(resolver.map_resource_name("web"), "");
}

// ============================================================================
// ALLOW / DENY
// ============================================================================

#[test]
fn test_empty_lists_permit() {
    assert!(resolver(PlatformRules::default()).is_allowed(&get_pods()));
}

#[test]
fn test_deny_without_allow_rejects() {
    let resolver = resolver(PlatformRules {
        deny_list: vec![AccessRule::new("*", "*", "*", "pods", "*")],
        ..Default::default()
    });
    assert!(!resolver.is_allowed(&get_pods()));
    assert!(resolver.is_allowed(&RequestFields::new("get", "ns", "", "secrets", "x")));
}

#[test]
fn test_allow_overrides_deny() {
    let resolver = resolver(PlatformRules {
        allow_list: vec![AccessRule::new("get", "ns", "", "pods", "*")],
        deny_list: vec![AccessRule::new("*", "*", "*", "*", "*")],
        ..Default::default()
    });
    assert!(resolver.is_allowed(&get_pods()));
    assert!(!resolver.is_allowed(&RequestFields::new("delete", "ns", "", "pods", "web")));
}

#[test]
fn test_admin_access() {
    let resolver = resolver(PlatformRules {
        admin_access_list: vec![AccessRule::new("*", "kube-system", "*", "*", "*")],
        ..Default::default()
    });
    assert!(resolver.is_admin_access(&RequestFields::new("read", "kube-system", "", "pods", "")));
    assert!(!resolver.is_admin_access(&get_pods()));
}

#[test]
fn test_invalid_rule_fails_construction() {
    let rules = PlatformRules {
        allow_list: vec![AccessRule::new("get", "[", "", "", "")],
        ..Default::default()
    };
    assert!(Resolver::with_lookup(rules, |_| None).is_err());
}

// ============================================================================
// PROPERTY-BASED TESTS (PROPTEST)
// ============================================================================

proptest! {
    #[test]
    fn test_literal_rule_matches_iff_contained(
        rule in prop::array::uniform5("[a-z0-9-]{0,3}"),
        request in prop::array::uniform5("[a-z0-9-]{0,3}"),
        rule_group in "[a-z.]{0,4}",
        request_group in "[a-z.]{0,4}",
    ) {
        let access_rule = AccessRule::new(
            rule[0].clone(), rule[1].clone(), rule_group, rule[3].clone(), rule[4].clone(),
        );
        let fields = RequestFields::new(&request[0], &request[1], &request_group, &request[3], &request[4]);

        let contained = fields.canonical().contains(&access_rule.canonical());
        prop_assert_eq!(access_rule.matches(&fields), contained);
    }
}
