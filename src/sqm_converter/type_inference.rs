//! Value-mapping inference.
//!
//! Expressions that carry no type of their own (parameters, untyped
//! literals) take the mapping implied by the top of the inference stack.
//! Mappings of sibling expressions are determined from the domain model
//! alone; lowering never happens here.

use crate::domain_catalog::domain_model::{AttributeDescriptor, AttributeKind, ColumnMapping, EntityDescriptor};
use crate::domain_catalog::function_registry::{get_function_descriptor, widen, ReturnType};
use crate::domain_catalog::value_mapping::{JdbcMapping, JdbcType, ValueMapping};
use crate::sqm::navigable_path::NavigablePath;
use crate::sqm::parameters::SqmParameter;
use crate::sqm::tree::{SqmExpression, SqmQueryPart, SqmSelectable};

use super::errors::LoweringError;
use super::SqmToSqlAstConverter;

/// Entry of the type-inference stack.
#[derive(Debug, Clone)]
pub enum InferredType<'a> {
    /// Explicitly nothing to infer from
    None,
    Mapping(ValueMapping),
    /// First sibling whose mapping can be determined
    FromExpressions(Vec<&'a SqmExpression>),
}

impl<'a> InferredType<'a> {
    pub fn from_mapping(mapping: Option<ValueMapping>) -> Self {
        mapping.map(InferredType::Mapping).unwrap_or(InferredType::None)
    }
}

/// What a path segment's parent resolves to in the domain model.
enum MappingContainer<'m> {
    Entity(&'m EntityDescriptor),
    Embedded(&'m AttributeDescriptor),
    Cte(String),
}

impl<'a> SqmToSqlAstConverter<'a> {
    /// Mapping implied by the top of the inference stack.
    pub(crate) fn current_inferred_mapping(&self) -> Option<ValueMapping> {
        match self.inferred_types.current()? {
            InferredType::None => None,
            InferredType::Mapping(mapping) => Some(mapping.clone()),
            InferredType::FromExpressions(siblings) => self.first_determinable(siblings),
        }
    }

    pub(crate) fn first_determinable(&self, expressions: &[&SqmExpression]) -> Option<ValueMapping> {
        expressions
            .iter()
            .find_map(|expression| self.determine_value_mapping(expression))
    }

    /// Inference from siblings, falling back to whatever the enclosing
    /// context implies.
    pub(crate) fn sibling_inference(&self, siblings: &[&SqmExpression]) -> InferredType<'a> {
        InferredType::from_mapping(
            self.first_determinable(siblings)
                .or_else(|| self.current_inferred_mapping()),
        )
    }

    /// Value mapping of an SQM expression without lowering it.
    pub fn determine_value_mapping(&self, expression: &SqmExpression) -> Option<ValueMapping> {
        match expression {
            SqmExpression::Path { navigable_path } => self.path_value_mapping(navigable_path),
            SqmExpression::Literal { value, value_mapping } => value_mapping
                .clone()
                .or_else(|| JdbcType::from_json_value(value).map(ValueMapping::basic)),
            SqmExpression::Parameter(parameter) => self
                .parameter_mappings
                .get(&parameter.id)
                .cloned()
                .or_else(|| parameter.anticipated_type.clone())
                .or_else(|| {
                    self.bindings
                        .binding(&parameter.key)
                        .and_then(|binding| binding.inferred_mapping())
                }),
            SqmExpression::Function {
                name,
                arguments,
                return_type,
            } => return_type
                .clone()
                .or_else(|| self.function_value_mapping(name, arguments)),
            SqmExpression::CaseSearched {
                when_fragments,
                otherwise,
            } => when_fragments
                .iter()
                .map(|when| &when.result)
                .chain(otherwise.as_deref())
                .find_map(|result| self.determine_value_mapping(result)),
            SqmExpression::CaseSimple {
                when_fragments,
                otherwise,
                ..
            } => when_fragments
                .iter()
                .map(|when| &when.result)
                .chain(otherwise.as_deref())
                .find_map(|result| self.determine_value_mapping(result)),
            SqmExpression::UnaryOperation { operand, .. } => self.determine_value_mapping(operand),
            SqmExpression::BinaryArithmetic { left, right, .. } => {
                let left = self.determine_value_mapping(left)?.first_jdbc_mapping()?;
                let right = self.determine_value_mapping(right)?.first_jdbc_mapping()?;
                Some(ValueMapping::Basic(arithmetic_result(&left, &right)))
            }
            SqmExpression::Tuple { elements } => {
                let mut attributes = Vec::with_capacity(elements.len());
                for (position, element) in elements.iter().enumerate() {
                    attributes.push((position.to_string(), self.determine_value_mapping(element)?));
                }
                Some(ValueMapping::Embeddable {
                    name: "tuple".to_string(),
                    attributes,
                })
            }
            SqmExpression::Distinct { expression } => self.determine_value_mapping(expression),
            SqmExpression::Star => None,
            SqmExpression::SubQuery { query_part } => self.query_part_mapping(query_part),
        }
    }

    fn function_value_mapping(&self, name: &str, arguments: &[SqmExpression]) -> Option<ValueMapping> {
        let first_argument = || {
            arguments
                .first()
                .and_then(|argument| self.determine_value_mapping(argument))
        };
        match get_function_descriptor(name).map(|descriptor| descriptor.return_type) {
            Some(ReturnType::Fixed(jdbc_type)) => Some(ValueMapping::basic(jdbc_type)),
            Some(ReturnType::Widened) => first_argument()
                .and_then(|mapping| mapping.first_jdbc_mapping())
                .map(|mapping| ValueMapping::basic(widen(mapping.jdbc_type))),
            Some(ReturnType::FirstArgument) | None => first_argument(),
        }
    }

    /// Mapping of the first selection of a query part.
    pub(crate) fn query_part_mapping(&self, query_part: &SqmQueryPart) -> Option<ValueMapping> {
        match query_part {
            SqmQueryPart::Spec(spec) => {
                let selection = spec.select_clause.as_ref()?.selections.first()?;
                match &selection.selectable {
                    SqmSelectable::Expression { expression } => self.determine_value_mapping(expression),
                    SqmSelectable::DynamicInstantiation { .. } => None,
                }
            }
            SqmQueryPart::Group(group) => group
                .parts
                .first()
                .and_then(|part| self.query_part_mapping(part)),
        }
    }

    /// Domain-model mapping of a path; `None` when the path does not
    /// resolve.
    pub(crate) fn path_value_mapping(&self, path: &NavigablePath) -> Option<ValueMapping> {
        if path.is_root() {
            return match self.resolve_container(path)? {
                MappingContainer::Entity(entity) => Some(entity.value_mapping()),
                MappingContainer::Embedded(_) | MappingContainer::Cte(_) => None,
            };
        }
        let local = path.local_name();
        match self.resolve_container(&path.parent()?)? {
            MappingContainer::Entity(entity) => {
                let attribute = entity.find_attribute(local)?;
                self.metadata.attribute_value_mapping(attribute).ok()
            }
            MappingContainer::Embedded(attribute) => embedded_sub_column(attribute, local)
                .map(|column| ValueMapping::Basic(column.jdbc_mapping.clone())),
            MappingContainer::Cte(cte_name) => self
                .cte_shapes
                .get(&cte_name)?
                .iter()
                .find(|column| column.name == local)
                .map(|column| ValueMapping::Basic(column.jdbc_mapping.clone())),
        }
    }

    fn resolve_container(&self, path: &NavigablePath) -> Option<MappingContainer<'a>> {
        let metadata = self.metadata;
        if path.is_root() {
            let name = path.root_name();
            if self.cte_shapes.contains_key(name) {
                return Some(MappingContainer::Cte(name.to_string()));
            }
            return metadata.find_entity(name).map(MappingContainer::Entity);
        }
        match self.resolve_container(&path.parent()?)? {
            MappingContainer::Entity(entity) => {
                let attribute = entity.find_attribute(path.local_name())?;
                match &attribute.kind {
                    AttributeKind::ToOne { target_entity, .. } | AttributeKind::ToMany { target_entity, .. } => {
                        metadata.find_entity(target_entity).map(MappingContainer::Entity)
                    }
                    AttributeKind::Embedded { .. } => Some(MappingContainer::Embedded(attribute)),
                    AttributeKind::Basic { .. } => None,
                }
            }
            MappingContainer::Embedded(_) | MappingContainer::Cte(_) => None,
        }
    }

    /// Mapping used to lower a parameter occurrence: anticipated type, then
    /// the inference stack, then the binding.
    pub(crate) fn resolve_parameter_mapping(&self, parameter: &SqmParameter) -> Result<ValueMapping, LoweringError> {
        if let Some(anticipated) = &parameter.anticipated_type {
            return Ok(anticipated.clone());
        }
        if let Some(inferred) = self.current_inferred_mapping() {
            return Ok(inferred);
        }
        if let Some(from_binding) = self
            .bindings
            .binding(&parameter.key)
            .and_then(|binding| binding.inferred_mapping())
        {
            log::debug!("Parameter {} typed from its binding as {}", parameter.key, from_binding);
            return Ok(from_binding);
        }
        Err(LoweringError::conversion(format!(
            "could not determine a value mapping for parameter {} (occurrence {})",
            parameter.key, parameter.id.0
        )))
    }
}

/// Sub-column `local` of an embedded attribute.
pub(crate) fn embedded_sub_column<'d>(
    attribute: &'d AttributeDescriptor,
    local: &str,
) -> Option<&'d ColumnMapping> {
    match &attribute.kind {
        AttributeKind::Embedded { columns, .. } => {
            let selectable_path = format!("{}.{}", attribute.name, local);
            columns
                .iter()
                .find(|column| column.selectable_path == selectable_path)
        }
        _ => None,
    }
}

/// Result type of binary arithmetic over two operands.
pub(crate) fn arithmetic_result(left: &JdbcMapping, right: &JdbcMapping) -> JdbcMapping {
    fn rank(jdbc_type: JdbcType) -> u8 {
        match jdbc_type {
            JdbcType::Integer => 1,
            JdbcType::Bigint => 2,
            JdbcType::Decimal => 3,
            JdbcType::Double => 4,
            _ => 0,
        }
    }
    match (rank(left.jdbc_type), rank(right.jdbc_type)) {
        (0, 0) => left.clone(),
        (l, r) if l >= r => JdbcMapping::new(left.jdbc_type),
        _ => JdbcMapping::new(right.jdbc_type),
    }
}
