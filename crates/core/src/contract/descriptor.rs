//! Resolved descriptors and the resolver that builds them.
//!
//! Resolution turns a declarative definition into an immutable descriptor:
//! prefix and default schema applied, transforms built, metadata checked.
//! It performs no I/O and is deterministic for a given definition and
//! configuration, so descriptors are cached by type for the resolver's
//! lifetime.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::cache::DescriptorCache;
use super::definition::{ContractDefinition, EntityDefinition, MemberDefinition, TransformSpec};
use super::{Contract, Entity};
use crate::config::EngineConfig;
use crate::context::{CallKind, CallTarget};
use crate::driver::Direction;
use crate::error::{Error, Result};
use crate::transform::{
    EncryptionProvider, EnumStorage, EnumTransform, JsonTransform, SecureSpec, SecureTransform,
    Transform,
};

/// Resolved metadata of one member.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    /// Member name
    pub name: String,
    /// Parameter or column name
    pub source_name: String,
    /// Whether a null or absent value is an error
    pub required: bool,
    /// Parameter direction
    pub direction: Direction,
    /// Built transform (secure members carry their [`SecureTransform`] here)
    pub transform: Option<Arc<dyn Transform>>,
    /// Secure-value metadata
    pub secure: Option<SecureSpec>,
    /// Path this member is derived from
    pub derived_from: Option<Vec<String>>,
}

impl MemberDescriptor {
    /// Whether the member is computed from other arguments.
    pub fn is_derived(&self) -> bool {
        self.derived_from.is_some()
    }
}

/// Resolved contract.
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    name: String,
    target: CallTarget,
    members: Vec<MemberDescriptor>,
}

impl ContractDescriptor {
    /// Contract name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved call target.
    pub fn target(&self) -> &CallTarget {
        &self.target
    }

    /// Target object name (prefix applied).
    pub fn target_name(&self) -> &str {
        &self.target.name
    }

    /// Target schema.
    pub fn schema(&self) -> Option<&str> {
        self.target.schema.as_deref()
    }

    /// Call kind.
    pub fn kind(&self) -> CallKind {
        self.target.kind
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    /// Member by name.
    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Resolved entity.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    members: Vec<MemberDescriptor>,
    by_source: HashMap<String, usize>,
}

impl EntityDescriptor {
    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    /// Member mapped from `column`, matched case-insensitively.
    pub fn member_for_column(&self, column: &str) -> Option<&MemberDescriptor> {
        self.by_source
            .get(&column.to_ascii_lowercase())
            .map(|&i| &self.members[i])
    }

    /// Member by name.
    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Builds and caches descriptors for one engine configuration.
pub struct DescriptorResolver {
    procedure_prefix: String,
    view_prefix: String,
    default_schema: Option<String>,
    enum_storage: EnumStorage,
    provider: Option<Arc<dyn EncryptionProvider>>,
    cache: DescriptorCache,
}

impl DescriptorResolver {
    /// Create a resolver for `config`.
    pub fn new(config: &EngineConfig, provider: Option<Arc<dyn EncryptionProvider>>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            procedure_prefix: config.procedure_prefix.clone(),
            view_prefix: config.view_prefix.clone(),
            default_schema: config.default_schema.clone(),
            enum_storage: config.enum_storage,
            provider,
            cache: DescriptorCache::new(),
        })
    }

    /// Descriptor of contract `C`, resolved on first use.
    pub fn contract<C: Contract>(&self) -> Result<Arc<ContractDescriptor>> {
        self.cache
            .get_or_try_insert::<C, ContractDescriptor, _>(|| self.resolve_contract(C::definition()))
    }

    /// Descriptor of entity `T`, resolved on first use.
    pub fn entity<T: Entity>(&self) -> Result<Arc<EntityDescriptor>> {
        self.cache
            .get_or_try_insert::<T, EntityDescriptor, _>(|| self.resolve_entity(T::definition()))
    }

    /// The underlying cache, for other per-type metadata.
    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    /// Resolve a contract definition without caching.
    pub fn resolve_contract(&self, def: ContractDefinition) -> Result<ContractDescriptor> {
        let owner = def.name.clone();
        if def.name.trim().is_empty() && def.target.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(Error::definition("<unnamed>", "contract has no name"));
        }

        let name = match def.target {
            Some(explicit) if !explicit.trim().is_empty() => explicit,
            _ => {
                let prefix = match def.kind {
                    CallKind::StoredProcedure => &self.procedure_prefix,
                    CallKind::View => &self.view_prefix,
                };
                apply_prefix(prefix, &def.name)
            }
        };
        let schema = def.schema.or_else(|| self.default_schema.clone());

        let members = self.resolve_members(&owner, def.members, true)?;

        Ok(ContractDescriptor {
            name: owner,
            target: CallTarget {
                name,
                schema,
                kind: def.kind,
            },
            members,
        })
    }

    /// Resolve an entity definition without caching.
    pub fn resolve_entity(&self, def: EntityDefinition) -> Result<EntityDescriptor> {
        let owner = def.name.clone();
        if owner.trim().is_empty() {
            return Err(Error::definition("<unnamed>", "entity has no name"));
        }
        let members = self.resolve_members(&owner, def.members, false)?;
        let by_source = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.source_name.to_ascii_lowercase(), i))
            .collect();
        Ok(EntityDescriptor {
            name: owner,
            members,
            by_source,
        })
    }

    fn resolve_members(
        &self,
        owner: &str,
        defs: Vec<MemberDefinition>,
        is_contract: bool,
    ) -> Result<Vec<MemberDescriptor>> {
        let mut names: HashSet<String> = HashSet::new();
        let mut sources: HashMap<String, String> = HashMap::new();

        for def in &defs {
            if def.name.trim().is_empty() {
                return Err(Error::definition(owner, "member has no name"));
            }
            if !names.insert(def.name.clone()) {
                return Err(Error::definition(owner, format!("duplicate member '{}'", def.name)));
            }
            let source = def.source.clone().unwrap_or_else(|| def.name.clone());
            if let Some(previous) = sources.insert(source.to_ascii_lowercase(), def.name.clone()) {
                return Err(Error::definition(
                    owner,
                    format!(
                        "members '{previous}' and '{}' both map to source name '{source}'",
                        def.name
                    ),
                ));
            }
        }

        let mut members = Vec::with_capacity(defs.len());
        for def in &defs {
            if def.transform.is_some() && def.secure.is_some() {
                return Err(Error::definition(
                    owner,
                    format!("member '{}' declares both a transform and a secure value", def.name),
                ));
            }
            if let Some(spec) = &def.secure {
                if spec.authenticator_member == def.name || !names.contains(&spec.authenticator_member) {
                    return Err(Error::definition(
                        owner,
                        format!(
                            "secure member '{}' names unknown authenticator member '{}'",
                            def.name, spec.authenticator_member
                        ),
                    ));
                }
                if spec.classification.trim().is_empty() {
                    return Err(Error::definition(
                        owner,
                        format!("secure member '{}' has no data classification", def.name),
                    ));
                }
            }
            if let Some(path) = &def.derived_from {
                check_derived(owner, def, path, &defs, is_contract)?;
            }

            let transform: Option<Arc<dyn Transform>> = match (&def.transform, &def.secure) {
                (Some(TransformSpec::Custom(t)), _) => Some(Arc::clone(t)),
                (Some(TransformSpec::Enum(ty)), _) => Some(Arc::new(
                    EnumTransform::new(ty.clone()).with_storage(self.enum_storage),
                )),
                (Some(TransformSpec::Json), _) => Some(Arc::new(JsonTransform)),
                (None, Some(spec)) => Some(Arc::new(SecureTransform::new(
                    self.provider.clone(),
                    spec.clone(),
                ))),
                (None, None) => None,
            };

            members.push(MemberDescriptor {
                name: def.name.clone(),
                source_name: def.source.clone().unwrap_or_else(|| def.name.clone()),
                required: def.required,
                direction: def.direction,
                transform,
                secure: def.secure.clone(),
                derived_from: def.derived_from.clone(),
            });
        }
        Ok(members)
    }
}

fn apply_prefix(prefix: &str, name: &str) -> String {
    let already = name.len() >= prefix.len()
        && name.is_char_boundary(prefix.len())
        && name[..prefix.len()].eq_ignore_ascii_case(prefix);
    if prefix.is_empty() || already {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}

fn check_derived(
    owner: &str,
    def: &MemberDefinition,
    path: &[String],
    defs: &[MemberDefinition],
    is_contract: bool,
) -> Result<()> {
    if !is_contract {
        return Err(Error::definition(
            owner,
            format!("entity member '{}' cannot be derived", def.name),
        ));
    }
    if path.len() < 2 || path.iter().any(|p| p.trim().is_empty()) {
        return Err(Error::definition(
            owner,
            format!("derived member '{}' needs a path of at least two segments", def.name),
        ));
    }
    if def.direction.is_output() {
        return Err(Error::definition(
            owner,
            format!("derived member '{}' cannot be an output", def.name),
        ));
    }
    let root = &path[0];
    if root == &def.name {
        return Err(Error::definition(
            owner,
            format!("derived member '{}' refers to itself", def.name),
        ));
    }
    if defs.iter().any(|d| &d.name == root && d.derived_from.is_some()) {
        return Err(Error::definition(
            owner,
            format!("derived member '{}' is rooted at derived member '{root}'", def.name),
        ));
    }
    Ok(())
}
