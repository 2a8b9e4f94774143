//! Configuration build: validate declarations, expand auto-mapping and
//! compile everything into a [`RuleSet`].
//!
//! All problems found anywhere in the declaration list are collected into one
//! [`ConfigError::Invalid`]; a rule set is only produced when there are none.

use crate::automap::expand_map_all;
use crate::context::Dependencies;
use crate::conversion::{ConversionRegistry, Converter};
use crate::declaration::{ComputeFn, Declaration, DeclarationKind, PropertySource};
use crate::error::{ConfigError, ConfigIssue, ConfigIssueKind, MappingError, UnknownMember};
use crate::rules::{ElementPlan, EntryKind, Getter, MappingEntry, PropertyAction, RuleSet, Setter};
use crate::types::{Member, TypeRef, TypeRegistry};
use crate::value::{ObjectRef, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub fn build_rule_set(
    types: Arc<TypeRegistry>,
    declarations: &[Declaration],
    conversions: &ConversionRegistry,
) -> Result<RuleSet, ConfigError> {
    let mut issues = Vec::new();
    let mut entries = Vec::new();

    for declaration in declarations.iter().filter(|d| !d.is_map_all()) {
        match compile(&types, conversions, declarations, declaration) {
            Ok(entry) => entries.push(entry),
            Err(mut found) => issues.append(&mut found),
        }
    }

    for declaration in declarations {
        let DeclarationKind::MapAll { except } = &declaration.kind else {
            continue;
        };
        let expansion = expand_map_all(
            &types,
            conversions,
            declarations,
            declaration.source,
            declaration.target,
            except,
        );
        issues.extend(expansion.issues);
        for generated in &expansion.declarations {
            match compile(&types, conversions, declarations, generated) {
                Ok(entry) => entries.push(entry),
                Err(mut found) => issues.append(&mut found),
            }
        }
    }

    if !issues.is_empty() {
        for issue in &issues {
            warn!(
                kind = issue.kind.as_str(),
                source = issue.source.as_str(),
                target = issue.target.as_str(),
                "{}",
                issue.message
            );
        }
        return Err(ConfigError::Invalid { issues });
    }

    for entry in &entries {
        debug!(kind = entry.kind.name(), entry = %entry.description, "compiled mapping entry");
    }
    let rules = RuleSet::new(types, conversions.clone(), entries);
    info!(
        entries = rules.len(),
        fingerprint = rules.fingerprint(),
        "built mapping rule set"
    );
    Ok(rules)
}

/// Entry description, e.g. `Foo.Property1 -> Bar.Property3`.
pub fn describe(types: &TypeRegistry, declaration: &Declaration) -> String {
    let source = types.name(declaration.source);
    let target = types.name(declaration.target);
    match &declaration.kind {
        DeclarationKind::Property { from, to, .. } => {
            format!("{source}.{} -> {target}.{to}", from.label())
        }
        DeclarationKind::Object { from, to } | DeclarationKind::Collection { from, to } => {
            format!("{source}.{from} -> {target}.{to}")
        }
        DeclarationKind::Function { .. } => format!("MappingFunction({source}, {target})"),
        DeclarationKind::MapAll { .. } => format!("MapAll: {source}->{target}"),
        DeclarationKind::Ignore { member } => format!("Ignored: -> {target}.{member}"),
    }
}

struct Scope<'a> {
    types: &'a Arc<TypeRegistry>,
    declaration: &'a Declaration,
    issues: Vec<ConfigIssue>,
}

impl<'a> Scope<'a> {
    fn issue(&mut self, kind: ConfigIssueKind, member: &str, message: String) {
        self.issues.push(ConfigIssue::new(
            kind,
            self.types.name(self.declaration.source),
            self.types.name(self.declaration.target),
            Some(member),
            message,
        ));
    }

    fn target_member(&mut self, name: &str) -> Option<Member> {
        let target = self.declaration.target;
        let found = self.types.member(target, name);
        if found.is_none() {
            let message = format!(
                "{}: no member {name} on target type {}",
                describe(self.types, self.declaration),
                self.types.name(target)
            );
            self.issue(ConfigIssueKind::MissingMemberOnTarget, name, message);
        }
        found
    }

    fn source_member(&mut self, name: &str) -> Option<Member> {
        let source = self.declaration.source;
        let found = self.types.member(source, name);
        if found.is_none() {
            let message = format!(
                "{}: no member {name} on source type {}",
                describe(self.types, self.declaration),
                self.types.name(source)
            );
            self.issue(ConfigIssueKind::MissingMemberOnSource, name, message);
        }
        found
    }

    fn finish(self, kind: Option<EntryKind>) -> Result<MappingEntry, Vec<ConfigIssue>> {
        match kind {
            Some(kind) if self.issues.is_empty() => Ok(MappingEntry {
                source: self.declaration.source,
                target: self.declaration.target,
                description: describe(self.types, self.declaration),
                kind,
            }),
            _ => Err(self.issues),
        }
    }
}

fn compile(
    types: &Arc<TypeRegistry>,
    conversions: &ConversionRegistry,
    declarations: &[Declaration],
    declaration: &Declaration,
) -> Result<MappingEntry, Vec<ConfigIssue>> {
    let mut scope = Scope {
        types,
        declaration,
        issues: Vec::new(),
    };
    let kind = match &declaration.kind {
        DeclarationKind::Property {
            from,
            to,
            convert,
            dependencies,
        } => compile_property(&mut scope, conversions, from, to, convert.clone()).map(|action| {
            EntryKind::Property {
                action,
                dependencies: dependencies.clone(),
            }
        }),
        DeclarationKind::Object { from, to } => compile_object(&mut scope, from, to),
        DeclarationKind::Collection { from, to } => {
            compile_collection(&mut scope, conversions, declarations, from, to)
        }
        DeclarationKind::Function {
            action,
            dependencies,
        } => Some(EntryKind::Function {
            action: action.clone(),
            dependencies: dependencies.clone(),
        }),
        DeclarationKind::Ignore { member } => scope
            .target_member(member)
            .map(|_| EntryKind::Ignore {
                member: member.clone(),
            }),
        DeclarationKind::MapAll { .. } => None,
    };
    scope.finish(kind)
}

fn compile_property(
    scope: &mut Scope<'_>,
    conversions: &ConversionRegistry,
    from: &PropertySource,
    to: &str,
    convert: Option<Converter>,
) -> Option<PropertyAction> {
    let types = scope.types;
    let target_member = scope.target_member(to);
    let read: Option<(ComputeFn, Option<TypeRef>)> = match from {
        PropertySource::Member(name) => scope.source_member(name).map(|member| {
            let get = member_getter(name);
            let read: ComputeFn =
                Arc::new(move |source: &ObjectRef, _: &Dependencies| get(source));
            (read, Some(member.ty))
        }),
        PropertySource::Computed(compute) => Some((compute.clone(), None)),
    };
    let target_member = target_member?;
    let (read, source_ty) = read?;

    if !target_member.writable {
        let message = format!(
            "{}: {}.{to} has no setter",
            describe(types, scope.declaration),
            types.name(scope.declaration.target)
        );
        scope.issue(ConfigIssueKind::MissingMemberOnTarget, to, message);
        return None;
    }

    let convert = match (convert, source_ty) {
        (Some(explicit), _) => Some(explicit),
        (None, Some(source_ty)) if !types.is_compatible(target_member.ty, source_ty) => {
            if !conversions.can_convert(types, source_ty, target_member.ty) {
                let message = format!(
                    "{}: {} is not assignable to {} and no conversion is registered",
                    describe(types, scope.declaration),
                    types.name(source_ty),
                    types.name(target_member.ty)
                );
                scope.issue(ConfigIssueKind::TypeMismatch, to, message);
                return None;
            }
            match conversions.create_converter(types, source_ty, target_member.ty) {
                Ok(converter) => Some(converter),
                Err(err) => {
                    let message = format!("{}: {err}", describe(types, scope.declaration));
                    scope.issue(ConfigIssueKind::ConversionUnavailable, to, message);
                    return None;
                }
            }
        }
        _ => None,
    };

    let set = member_setter(types, scope.declaration.target, target_member);
    Some(Arc::new(
        move |source: &ObjectRef, target: &ObjectRef, dependencies: &Dependencies| {
            let mut value = read(source, dependencies)?;
            if let Some(convert) = &convert {
                value = convert(value)?;
            }
            set(target, value)
        },
    ))
}

fn compile_object(scope: &mut Scope<'_>, from: &str, to: &str) -> Option<EntryKind> {
    let types = scope.types;
    let source_member = scope.source_member(from);
    let target_member = scope.target_member(to)?;
    source_member?;

    if !types.is_class(target_member.ty) {
        let message = format!(
            "{}: {}.{to} is not an object member",
            describe(types, scope.declaration),
            types.name(scope.declaration.target)
        );
        scope.issue(ConfigIssueKind::MissingMemberOnTarget, to, message);
        return None;
    }

    Some(EntryKind::Object {
        source: member_getter(from),
        existing: member_getter(to),
        target_type: target_member.ty,
        attach: member_setter(types, scope.declaration.target, target_member),
    })
}

fn compile_collection(
    scope: &mut Scope<'_>,
    conversions: &ConversionRegistry,
    declarations: &[Declaration],
    from: &str,
    to: &str,
) -> Option<EntryKind> {
    let types = scope.types;
    let source_member = scope.source_member(from);
    let target_member = scope.target_member(to)?;
    let source_member = source_member?;

    if types.collection_shape(source_member.ty).is_none() {
        let message = format!(
            "{}: {}.{from} is not a collection",
            describe(types, scope.declaration),
            types.name(scope.declaration.source)
        );
        scope.issue(ConfigIssueKind::NotACollection, from, message);
        return None;
    }

    let element_type = match types.element_type(target_member.ty) {
        Ok(Some(element)) => element,
        Ok(None) => {
            let message = format!(
                "{}: {}.{to} is not a collection",
                describe(types, scope.declaration),
                types.name(scope.declaration.target)
            );
            scope.issue(ConfigIssueKind::NotACollection, to, message);
            return None;
        }
        Err(err) => {
            let message = format!("{}: {err}", describe(types, scope.declaration));
            scope.issue(ConfigIssueKind::AmbiguousCollectionElementType, to, message);
            return None;
        }
    };

    let element = match types.element_type(source_member.ty) {
        Ok(Some(source_element)) => {
            plan_element(scope, conversions, declarations, source_element, element_type, to)?
        }
        Ok(None) => ElementPlan::Map,
        Err(err) => {
            let message = format!("{}: {err}", describe(types, scope.declaration));
            scope.issue(ConfigIssueKind::AmbiguousCollectionElementType, from, message);
            return None;
        }
    };

    Some(EntryKind::Collection {
        source: member_getter(from),
        existing: member_getter(to),
        collection_type: target_member.ty,
        element_type,
        element,
        attach: member_setter(types, scope.declaration.target, target_member),
    })
}

/// Object items need a declared rule for their pair; scalar items must
/// conform or convert.
fn plan_element(
    scope: &mut Scope<'_>,
    conversions: &ConversionRegistry,
    declarations: &[Declaration],
    source: TypeRef,
    target: TypeRef,
    to: &str,
) -> Option<ElementPlan> {
    let types = scope.types;
    if types.is_class(source) || types.is_class(target) {
        let declared = declarations.iter().any(|d| {
            !matches!(d.kind, DeclarationKind::Ignore { .. })
                && (types.is_assignable_from(d.source, source)
                    || types.is_assignable_from(source, d.source))
                && types.is_assignable_from(target, d.target)
        });
        if !declared {
            let message = format!(
                "{}: no mapping found for {}->{}",
                describe(types, scope.declaration),
                types.name(source),
                types.name(target)
            );
            scope.issue(ConfigIssueKind::NoNestedMapping, to, message);
            return None;
        }
        return Some(ElementPlan::Map);
    }
    if types.is_compatible(target, source) {
        return Some(ElementPlan::Map);
    }
    if !conversions.can_convert(types, source, target) {
        let message = format!(
            "{}: {} items are not assignable to {} and no conversion is registered",
            describe(types, scope.declaration),
            types.name(source),
            types.name(target)
        );
        scope.issue(ConfigIssueKind::TypeMismatch, to, message);
        return None;
    }
    match conversions.create_converter(types, source, target) {
        Ok(converter) => Some(ElementPlan::Convert(converter)),
        Err(err) => {
            let message = format!("{}: {err}", describe(types, scope.declaration));
            scope.issue(ConfigIssueKind::ConversionUnavailable, to, message);
            None
        }
    }
}

fn member_getter(member: &str) -> Getter {
    let member = member.to_string();
    Arc::new(move |instance: &ObjectRef| {
        instance.get(&member).ok_or_else(|| {
            MappingError::from(UnknownMember {
                type_name: instance.type_name(),
                member: member.clone(),
            })
        })
    })
}

/// Setter that checks writability and the declared member type.
fn member_setter(types: &Arc<TypeRegistry>, owner: TypeRef, member: Member) -> Setter {
    let types = types.clone();
    Arc::new(move |instance: &ObjectRef, value: Value| {
        if !member.writable {
            return Err(MappingError::MemberNotWritable {
                type_name: types.name(owner).to_string(),
                member: member.name.clone(),
            });
        }
        if !types.conforms(member.ty, &value) {
            return Err(MappingError::TypeMismatch {
                member: format!("{}.{}", types.name(owner), member.name),
                expected: types.name(member.ty).to_string(),
                found: value.kind_name(),
            });
        }
        instance.set(&member.name, value)?;
        Ok(())
    })
}
