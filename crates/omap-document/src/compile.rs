//! Loading a mapping document and compiling it into a ready-to-use mapper.

use crate::codec;
use crate::error::DocumentError;
use crate::model::{MappingDocument, RuleDecl, TypeDeclKind};
use crate::resolver::DocumentResolver;
use crate::type_expr::resolve_type;
use omap_kernel::error::UnknownMember;
use omap_kernel::{
    ConfigurationBuilder, Dependencies, DependencySpec, MapperOptions, MappingError, Member,
    ObjectMapper, ObjectRef, RuleSet, TypeRef, TypeRegistry, Value,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Read a document, choosing the format by file extension.
pub fn load_document(path: &Path) -> Result<MappingDocument, DocumentError> {
    let origin = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| DocumentError::ReadFile {
        path: origin.clone(),
        source,
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => parse_toml(&text, &origin),
        Some("json") => parse_json(&text, &origin),
        _ => Err(DocumentError::UnsupportedFormat { path: origin }),
    }
}

pub fn parse_toml(text: &str, origin: &str) -> Result<MappingDocument, DocumentError> {
    toml::from_str(text).map_err(|source| DocumentError::ParseToml {
        path: origin.to_string(),
        source,
    })
}

pub fn parse_json(text: &str, origin: &str) -> Result<MappingDocument, DocumentError> {
    serde_json::from_str(text).map_err(|source| DocumentError::ParseJson {
        path: origin.to_string(),
        source,
    })
}

/// A document's types, compiled rules, constant dependencies and options.
#[derive(Clone)]
pub struct CompiledDocument {
    types: Arc<TypeRegistry>,
    rules: Arc<RuleSet>,
    resolver: Arc<DocumentResolver>,
    options: MapperOptions,
}

impl CompiledDocument {
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        Self::compile(&load_document(path)?)
    }

    pub fn compile(document: &MappingDocument) -> Result<Self, DocumentError> {
        let mut types = register_types(document)?;

        let mut constants = Vec::with_capacity(document.dependencies.len());
        for dependency in &document.dependencies {
            let ty = resolve_type(&mut types, &dependency.ty)?;
            constants.push((ty, dependency.name.clone(), dependency.value.clone()));
        }

        let mut builder = if document.options.standard_conversions {
            ConfigurationBuilder::with_standard_conversions()
        } else {
            ConfigurationBuilder::new()
        };
        for rule in &document.rules {
            declare_rule(&mut types, &mut builder, rule)?;
        }

        let types = Arc::new(types);
        let rules = builder.build(types.clone())?;
        let mut resolver = DocumentResolver::new();
        for (ty, name, value) in constants {
            resolver.insert(ty, name.as_deref(), value);
        }
        let options = MapperOptions {
            max_depth: match document.options.max_depth {
                None => MapperOptions::default().max_depth,
                Some(0) => None,
                Some(limit) => Some(limit),
            },
        };

        info!(
            types = document.types.len(),
            rules = document.rules.len(),
            entries = rules.len(),
            fingerprint = rules.fingerprint(),
            "compiled mapping document"
        );
        Ok(Self {
            types,
            rules: Arc::new(rules),
            resolver: Arc::new(resolver),
            options,
        })
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn resolver(&self) -> &DocumentResolver {
        &self.resolver
    }

    pub fn options(&self) -> MapperOptions {
        self.options
    }

    pub fn mapper(&self) -> ObjectMapper {
        ObjectMapper::new(self.rules.clone(), self.resolver.clone()).with_options(self.options)
    }

    /// A declared class type by name.
    pub fn class(&self, name: &str) -> Result<TypeRef, DocumentError> {
        class_ref(&self.types, name)
    }

    /// Decode a JSON object of declared type `ty`.
    pub fn decode_object(
        &self,
        ty: TypeRef,
        json: &serde_json::Value,
    ) -> Result<ObjectRef, DocumentError> {
        match codec::decode(&self.types, ty, json)? {
            Value::Object(object) => Ok(object),
            other => Err(DocumentError::decode(
                "$",
                format!("expected an object, got {}", other.kind_name()),
            )),
        }
    }

    pub fn encode(&self, value: &Value) -> Result<serde_json::Value, DocumentError> {
        codec::encode(&self.types, value)
    }
}

fn class_ref(types: &TypeRegistry, name: &str) -> Result<TypeRef, DocumentError> {
    let ty = types
        .lookup(name)
        .ok_or_else(|| DocumentError::UnknownType(name.to_string()))?;
    if !types.is_class(ty) {
        return Err(DocumentError::Invalid(format!("{name} is not a class type")));
    }
    Ok(ty)
}

/// Names first, then supertypes, then members, so declarations may refer to
/// types declared later in the document.
fn register_types(document: &MappingDocument) -> Result<TypeRegistry, DocumentError> {
    let mut types = TypeRegistry::new();
    let mut declared = Vec::with_capacity(document.types.len());
    for decl in &document.types {
        let ty = match decl.kind {
            TypeDeclKind::Class => types.declare_class(&decl.name)?,
            TypeDeclKind::Abstract => types.declare_abstract_class(&decl.name)?,
            TypeDeclKind::Opaque => types.declare_opaque(&decl.name)?,
        };
        declared.push(ty);
    }

    for (decl, &ty) in document.types.iter().zip(&declared) {
        for base in &decl.extends {
            let base = class_ref(&types, base)?;
            types.extend(ty, base)?;
        }
    }

    for (decl, &ty) in document.types.iter().zip(&declared) {
        for member in &decl.members {
            let member_ty = resolve_type(&mut types, &member.ty)?;
            let mut built = Member::new(member.name.as_str(), member_ty);
            if !member.writable {
                built = built.read_only();
            }
            if !member.public {
                built = built.hidden();
            }
            if member.construct {
                built = built.constructed();
            }
            types.add_member(ty, built)?;
        }
        debug!(
            name = decl.name.as_str(),
            members = decl.members.len(),
            "declared document type"
        );
    }
    Ok(types)
}

fn declare_rule(
    types: &mut TypeRegistry,
    builder: &mut ConfigurationBuilder,
    rule: &RuleDecl,
) -> Result<(), DocumentError> {
    let label = format!("rule {}->{}", rule.source, rule.target);
    let source = class_ref(types, &rule.source)?;
    let target = class_ref(types, &rule.target)?;

    let mut requested = Vec::with_capacity(rule.dependencies.len());
    let mut spec = DependencySpec::new();
    for dependency in &rule.dependencies {
        let ty = resolve_type(types, &dependency.ty)?;
        spec = spec.with(ty, dependency.name.as_deref());
        requested.push((ty, dependency.name.clone()));
    }

    let mut node = builder.map(source, target);
    if !spec.is_empty() {
        node = node.with_dependencies(spec);
    }

    for property in &rule.properties {
        match (&property.from, &property.dependency) {
            (Some(from), None) => node = node.property(from, &property.to),
            (None, Some(dependency)) => {
                let ty = resolve_type(types, dependency)?;
                let index = requested
                    .iter()
                    .position(|(t, name)| *t == ty && *name == property.name)
                    .ok_or_else(|| {
                        DocumentError::Invalid(format!(
                            "{label}: property {} uses dependency {dependency} the rule does not declare",
                            property.to
                        ))
                    })?;
                let member = property.member.clone();
                node = node.property_with(&property.to, move |_, dependencies| {
                    dependency_value(dependencies, index, member.as_deref())
                });
            }
            _ => {
                return Err(DocumentError::Invalid(format!(
                    "{label}: property {} needs exactly one of `from` or `dependency`",
                    property.to
                )));
            }
        }
    }
    for link in &rule.objects {
        node = node.object(&link.from, &link.to);
    }
    for link in &rule.collections {
        node = node.collection(&link.from, &link.to);
    }
    for member in &rule.ignore {
        node = node.ignore(member);
    }
    if rule.map_all {
        let except: Vec<&str> = rule.except.iter().map(String::as_str).collect();
        node.map_all_except(&except);
    } else if !rule.except.is_empty() {
        return Err(DocumentError::Invalid(format!(
            "{label}: `except` requires `map_all = true`"
        )));
    }
    Ok(())
}

fn dependency_value(
    dependencies: &Dependencies,
    index: usize,
    member: Option<&str>,
) -> Result<Value, MappingError> {
    let value = dependencies
        .get(index)
        .cloned()
        .ok_or_else(|| MappingError::custom(format!("dependency #{index} was not resolved")))?;
    let Some(member) = member else {
        return Ok(value);
    };
    let object = value.as_object().ok_or(MappingError::NotAnObject {
        found: value.kind_name(),
    })?;
    object.get(member).ok_or_else(|| {
        MappingError::from(UnknownMember {
            type_name: object.type_name(),
            member: member.to_string(),
        })
    })
}
