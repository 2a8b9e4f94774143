//! Expansion of `map_all` declarations into per-member declarations.
//!
//! Target members are matched to source members by case-insensitive name.
//! Each matched pair becomes, in priority order, a direct property copy, a
//! converted property copy, or a nested object/collection mapping backed by an
//! existing declaration for the element (or member) type pair.

use crate::conversion::ConversionRegistry;
use crate::declaration::{Declaration, DeclarationKind, PropertySource};
use crate::error::{ConfigIssue, ConfigIssueKind};
use crate::types::{Member, TypeRef, TypeRegistry};
use std::collections::BTreeSet;
use tracing::debug;

/// Result of expanding one `map_all` declaration.
#[derive(Debug, Default)]
pub struct Expansion {
    pub declarations: Vec<Declaration>,
    pub issues: Vec<ConfigIssue>,
}

/// Expand `map_all` for `source -> target`.
///
/// `declarations` is the full declaration list, in any order relative to the
/// `map_all` itself: members covered by explicit or ignore declarations
/// applicable to the pair are skipped, and nested mappings may refer to any
/// declared pair (including other `map_all`s, so circular configurations
/// resolve).
pub fn expand_map_all(
    types: &TypeRegistry,
    conversions: &ConversionRegistry,
    declarations: &[Declaration],
    source: TypeRef,
    target: TypeRef,
    except: &[String],
) -> Expansion {
    let mut expansion = Expansion::default();
    let source_name = types.name(source);
    let target_name = types.name(target);

    let target_members: Vec<Member> = types
        .members(target)
        .into_iter()
        .filter(|m| m.public)
        .collect();
    let source_members: Vec<Member> = types
        .members(source)
        .into_iter()
        .filter(|m| m.public)
        .collect();

    for name in except {
        if !target_members.iter().any(|m| &m.name == name) {
            expansion.issues.push(ConfigIssue::new(
                ConfigIssueKind::MissingMemberOnTarget,
                source_name,
                target_name,
                Some(name),
                format!("{source_name}->{target_name}: excluded member {name} does not exist on {target_name}"),
            ));
        }
    }

    let covered = covered_members(types, declarations, source, target);
    let remaining = target_members
        .iter()
        .filter(|m| !except.contains(&m.name) && !covered.contains(m.name.as_str()));

    let mut unmatched = Vec::new();
    for target_member in remaining {
        let Some(source_member) = find_source_member(&source_members, &target_member.name) else {
            unmatched.push(target_member.name.clone());
            continue;
        };
        match plan_member(
            types,
            conversions,
            declarations,
            (source, source_member),
            (target, target_member),
        ) {
            Ok(declaration) => {
                debug!(
                    source = source_name,
                    target = target_name,
                    member = target_member.name.as_str(),
                    kind = declaration.kind.name(),
                    "auto-mapped member"
                );
                expansion.declarations.push(declaration);
            }
            Err(issue) => expansion.issues.push(issue),
        }
    }

    for member in unmatched {
        expansion.issues.push(ConfigIssue::new(
            ConfigIssueKind::UnmatchedMember,
            source_name,
            target_name,
            Some(&member),
            format!(
                "{source_name}->{target_name}: could not find mapping equivalent for {member} on source type {source_name}"
            ),
        ));
    }

    expansion
}

/// Target members already taken care of by non-auto declarations.
fn covered_members<'d>(
    types: &TypeRegistry,
    declarations: &'d [Declaration],
    source: TypeRef,
    target: TypeRef,
) -> BTreeSet<&'d str> {
    declarations
        .iter()
        .filter(|d| !d.is_map_all())
        .filter(|d| {
            types.is_assignable_from(d.source, source) && types.is_assignable_from(d.target, target)
        })
        .filter_map(Declaration::covered_member)
        .collect()
}

/// Exact-case match first, otherwise the first case-insensitive match.
fn find_source_member<'m>(members: &'m [Member], name: &str) -> Option<&'m Member> {
    members.iter().find(|m| m.name == name).or_else(|| {
        let folded = name.to_lowercase();
        members.iter().find(|m| m.name.to_lowercase() == folded)
    })
}

fn plan_member(
    types: &TypeRegistry,
    conversions: &ConversionRegistry,
    declarations: &[Declaration],
    (source, source_member): (TypeRef, &Member),
    (target, target_member): (TypeRef, &Member),
) -> Result<Declaration, ConfigIssue> {
    let source_name = types.name(source);
    let target_name = types.name(target);
    let property = |convert| Declaration {
        source,
        target,
        kind: DeclarationKind::Property {
            from: PropertySource::member(&source_member.name),
            to: target_member.name.clone(),
            convert,
            dependencies: None,
        },
    };

    let direct = source_member.ty == target_member.ty;
    let convertible =
        !direct && conversions.can_convert(types, source_member.ty, target_member.ty);
    if direct || convertible {
        if !target_member.writable {
            return Err(ConfigIssue::new(
                ConfigIssueKind::MissingMemberOnTarget,
                source_name,
                target_name,
                Some(&target_member.name),
                format!("{target_name}.{} has no setter", target_member.name),
            ));
        }
        if direct {
            return Ok(property(None));
        }
        let converter = conversions
            .create_converter(types, source_member.ty, target_member.ty)
            .map_err(|err| {
                ConfigIssue::new(
                    ConfigIssueKind::ConversionUnavailable,
                    source_name,
                    target_name,
                    Some(&target_member.name),
                    format!(
                        "{source_name}.{}->{target_name}.{}: {err}",
                        source_member.name, target_member.name
                    ),
                )
            })?;
        return Ok(property(Some(converter)));
    }

    let element = |ty: TypeRef| {
        types.element_type(ty).map_err(|err| {
            ConfigIssue::new(
                ConfigIssueKind::AmbiguousCollectionElementType,
                source_name,
                target_name,
                Some(&target_member.name),
                err.to_string(),
            )
        })
    };
    let source_element = element(source_member.ty)?;
    let target_element = element(target_member.ty)?;
    if let (Some(from), Some(to)) = (source_element, target_element)
        && !types.is_class(from)
        && !types.is_class(to)
        && (types.is_compatible(to, from) || conversions.can_convert(types, from, to))
    {
        return Ok(Declaration {
            source,
            target,
            kind: DeclarationKind::Collection {
                from: source_member.name.clone(),
                to: target_member.name.clone(),
            },
        });
    }

    let mapping_source = source_element.unwrap_or(source_member.ty);
    let mapping_target = target_element.unwrap_or(target_member.ty);

    let declared = declarations
        .iter()
        .any(|d| d.source == mapping_source && d.target == mapping_target);
    if !declared {
        return Err(ConfigIssue::new(
            ConfigIssueKind::NoNestedMapping,
            source_name,
            target_name,
            Some(&target_member.name),
            format!(
                "could not create map for {source_name}.{}->{target_name}.{}: no mapping found for {}->{}",
                source_member.name,
                target_member.name,
                types.name(mapping_source),
                types.name(mapping_target)
            ),
        ));
    }

    let from = source_member.name.clone();
    let to = target_member.name.clone();
    let kind = if source_element.is_some() || target_element.is_some() {
        DeclarationKind::Collection { from, to }
    } else {
        DeclarationKind::Object { from, to }
    };
    Ok(Declaration {
        source,
        target,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::ConfigurationBuilder;
    use crate::types::ScalarKind;

    struct Fixture {
        types: TypeRegistry,
        foo: TypeRef,
        bar: TypeRef,
    }

    fn fixture() -> Fixture {
        let mut types = TypeRegistry::new();
        let int = types.scalar(ScalarKind::I32);
        let long = types.scalar(ScalarKind::I64);
        let foo = types.declare_class("Foo").unwrap();
        let bar = types.declare_class("Bar").unwrap();
        types.add_member(foo, Member::new("total", int)).unwrap();
        types.add_member(foo, Member::new("Count", int)).unwrap();
        types.add_member(bar, Member::new("Total", int)).unwrap();
        types.add_member(bar, Member::new("Count", long)).unwrap();
        Fixture { types, foo, bar }
    }

    #[test]
    fn matches_names_case_insensitively_and_converts() {
        let Fixture { types, foo, bar } = fixture();
        let mut builder = ConfigurationBuilder::with_standard_conversions();
        builder.map(foo, bar).map_all();

        let expansion = expand_map_all(
            &types,
            builder.conversions(),
            builder.declarations(),
            foo,
            bar,
            &[],
        );
        assert!(expansion.issues.is_empty(), "{:?}", expansion.issues);
        let planned: Vec<String> = expansion
            .declarations
            .iter()
            .map(|d| match &d.kind {
                DeclarationKind::Property { from, to, convert, .. } => {
                    format!("{}->{} converted={}", from.label(), to, convert.is_some())
                }
                other => other.name().to_string(),
            })
            .collect();
        assert_eq!(
            planned,
            vec!["total->Total converted=false", "Count->Count converted=true"]
        );
    }

    #[test]
    fn missing_conversion_leaves_member_unmapped() {
        let Fixture { types, foo, bar } = fixture();
        let mut builder = ConfigurationBuilder::new();
        builder.map(foo, bar).map_all();

        let expansion = expand_map_all(
            &types,
            builder.conversions(),
            builder.declarations(),
            foo,
            bar,
            &[],
        );
        assert_eq!(expansion.issues.len(), 1);
        assert_eq!(expansion.issues[0].kind, ConfigIssueKind::NoNestedMapping);
        assert_eq!(expansion.issues[0].member.as_deref(), Some("Count"));
    }

    #[test]
    fn covered_and_excepted_members_are_skipped() {
        let Fixture { types, foo, bar } = fixture();
        let mut builder = ConfigurationBuilder::new();
        builder
            .map(foo, bar)
            .map_all_except(&["Total"])
            .ignore("Count");

        let expansion = expand_map_all(
            &types,
            builder.conversions(),
            builder.declarations(),
            foo,
            bar,
            &["Total".to_string()],
        );
        assert!(expansion.issues.is_empty());
        assert!(expansion.declarations.is_empty());
    }

    #[test]
    fn every_unmatched_member_is_reported() {
        let mut types = TypeRegistry::new();
        let int = types.scalar(ScalarKind::I32);
        let empty = types.declare_class("Empty").unwrap();
        let wide = types.declare_class("Wide").unwrap();
        for name in ["A", "B", "C"] {
            types.add_member(wide, Member::new(name, int)).unwrap();
        }
        let expansion =
            expand_map_all(&types, &ConversionRegistry::new(), &[], empty, wide, &[]);
        let members: Vec<&str> = expansion
            .issues
            .iter()
            .filter_map(|i| i.member.as_deref())
            .collect();
        assert_eq!(members, vec!["A", "B", "C"]);
        assert!(
            expansion
                .issues
                .iter()
                .all(|i| i.kind == ConfigIssueKind::UnmatchedMember)
        );
    }

    #[test]
    fn exact_case_wins_over_folded_match() {
        let mut types = TypeRegistry::new();
        let int = types.scalar(ScalarKind::I32);
        let source = types.declare_class("Source").unwrap();
        let target = types.declare_class("Target").unwrap();
        types.add_member(source, Member::new("value", int)).unwrap();
        types.add_member(source, Member::new("Value", int)).unwrap();
        types.add_member(target, Member::new("Value", int)).unwrap();

        let expansion =
            expand_map_all(&types, &ConversionRegistry::new(), &[], source, target, &[]);
        match &expansion.declarations[0].kind {
            DeclarationKind::Property { from, .. } => assert_eq!(from.label(), "Value"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
