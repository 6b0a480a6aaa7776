// Query compiler
//
// Resolves API names against a registry snapshot, enforces column access,
// plans the query and lowers it to the structural IR before generation.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::error::{QueryError, Result};
use crate::models::*;
use crate::services::access::resolve_table_access;
use crate::services::generator::{GeneratedSql, SqlGenerator};
use crate::services::planner::plan_query;
use crate::services::registry::RegistrySnapshot;

/// Function name the IR carries for edit-distance filters
const FUZZY_FUNCTION: &str = "levenshtein";

/// Everything needed to execute and post-process one query
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub plan: QueryPlan,
    pub generated: GeneratedSql,
    pub meta: QueryResultMeta,
    /// Access decision per output column name
    pub column_access: HashMap<String, EffectiveColumnAccess>,
    pub aggregation_aliases: HashSet<String>,
    /// Root-table API names in select order, used to project cached rows
    pub output_columns: Vec<String>,
    pub by_ids: Option<Vec<Value>>,
    pub execute_mode: ExecuteMode,
}

/// Compile a query definition for one caller
///
/// # Arguments
/// * `definition` - Abstract query
/// * `context` - Caller roles
/// * `snapshot` - Registry generation to resolve against
/// * `generator` - Dialect registry
/// * `query_id` - Correlation id carried into the result metadata
pub fn compile_query(
    definition: &QueryDefinition,
    context: &CallerContext,
    snapshot: &RegistrySnapshot,
    generator: &SqlGenerator,
    query_id: &str,
) -> Result<CompiledQuery> {
    let planning_started = Instant::now();

    let root = lookup_table(snapshot, &definition.from)?;
    let mut joined: Vec<&TableSchema> = Vec::with_capacity(definition.joins.len());
    for join in &definition.joins {
        joined.push(lookup_table(snapshot, &join.table)?);
    }

    // Every table the statement touches, subqueries included
    let mut tables: Vec<&TableSchema> = vec![root];
    for &table in &joined {
        push_unique(&mut tables, table);
    }
    collect_exists_tables(snapshot, &definition.filters, &mut tables)?;
    for join in &definition.joins {
        collect_exists_tables(snapshot, &join.filters, &mut tables)?;
    }

    let mut access = HashMap::new();
    for table in &tables {
        let resolved = resolve_table_access(table, context, snapshot.roles());
        if !resolved.allowed {
            tracing::info!("Access denied to table {}", table.id);
            return Err(QueryError::AccessDenied {
                table: table.api_name.clone(),
                column: None,
            });
        }
        access.insert(table.id.clone(), resolved);
    }

    let cacheable = definition.by_ids.is_some()
        && definition.joins.is_empty()
        && definition.filters.is_empty()
        && definition.aggregations.is_empty()
        && definition.group_by.is_empty()
        && definition.order_by.is_empty()
        && definition.limit.is_none()
        && definition.offset.is_none()
        && !definition.distinct
        && definition.execute_mode != ExecuteMode::Count
        && cache_holds_columns(snapshot, root, definition, &access);
    let plan = plan_query(&tables, snapshot, definition.freshness, cacheable)?;
    tracing::info!(
        strategy = plan.strategy(),
        target = plan.target_database(),
        "Planned query over {} tables",
        tables.len()
    );

    let mut lowering = Lowering {
        snapshot,
        plan: &plan,
        access: &access,
        params: Vec::new(),
        next_subquery: 0,
    };
    let lowered = lowering.lower(definition, root, &joined)?;
    let params = std::mem::take(&mut lowering.params);
    let planning_ms = elapsed_ms(planning_started);

    let generation_started = Instant::now();
    let generated = generator.generate(&plan, &lowered.parts, &params)?;
    let generation_ms = elapsed_ms(generation_started);

    let tables_used = tables
        .iter()
        .map(|table| table_usage(table, &plan))
        .collect();

    let meta = QueryResultMeta {
        query_id: query_id.to_string(),
        strategy: plan.strategy().to_string(),
        target_database: plan.target_database().to_string(),
        dialect: generated.dialect,
        tables_used,
        columns: lowered.columns,
        timing: QueryTiming {
            planning_ms,
            generation_ms,
            execution_ms: None,
        },
        executed_at: None,
    };

    Ok(CompiledQuery {
        plan,
        generated,
        meta,
        column_access: lowered.column_access,
        aggregation_aliases: lowered.aggregation_aliases,
        output_columns: lowered.output_columns,
        by_ids: definition.by_ids.clone(),
        execute_mode: definition.execute_mode,
    })
}

fn lookup_table<'a>(snapshot: &'a RegistrySnapshot, api_name: &str) -> Result<&'a TableSchema> {
    snapshot
        .table_by_api_name(api_name)
        .ok_or_else(|| QueryError::Validation(format!("Unknown table: {}", api_name)))
}

/// Whether cached rows of `root` carry every column the query returns
fn cache_holds_columns(
    snapshot: &RegistrySnapshot,
    root: &TableSchema,
    definition: &QueryDefinition,
    access: &HashMap<String, EffectiveTableAccess>,
) -> bool {
    let cached = match snapshot
        .cache_for(&root.id)
        .and_then(|entry| entry.table.columns.as_ref())
    {
        Some(cached) => cached,
        None => return true,
    };

    match &definition.columns {
        Some(names) => names.iter().all(|name| cached.contains(name)),
        None => access.get(&root.id).map_or(false, |table| {
            table
                .columns
                .iter()
                .filter(|c| c.allowed)
                .all(|c| cached.contains(&c.api_name))
        }),
    }
}

fn push_unique<'a>(tables: &mut Vec<&'a TableSchema>, table: &'a TableSchema) {
    if !tables.iter().any(|t| t.id == table.id) {
        tables.push(table);
    }
}

fn collect_exists_tables<'a>(
    snapshot: &'a RegistrySnapshot,
    filters: &[QueryFilterNode],
    tables: &mut Vec<&'a TableSchema>,
) -> Result<()> {
    for node in filters {
        match node {
            QueryFilterNode::Group(group) => {
                collect_exists_tables(snapshot, &group.conditions, tables)?
            }
            QueryFilterNode::Exists(exists) => {
                push_unique(tables, lookup_table(snapshot, &exists.table)?);
                collect_exists_tables(snapshot, &exists.filters, tables)?;
            }
            QueryFilterNode::Filter(_) | QueryFilterNode::ColumnCompare(_) => {}
        }
    }
    Ok(())
}

fn table_usage(table: &TableSchema, plan: &QueryPlan) -> TableUsage {
    let (source, database, physical_name) = match plan {
        QueryPlan::Cache { .. } => (
            TableSource::Cache,
            plan.target_database().to_string(),
            table.physical_name.clone(),
        ),
        _ => match plan.table_override(&table.id) {
            Some(replica) => (
                TableSource::Materialized,
                plan.target_database().to_string(),
                replica.to_string(),
            ),
            None => (
                TableSource::Original,
                table.database.clone(),
                table.physical_name.clone(),
            ),
        },
    };

    TableUsage {
        table_id: table.id.clone(),
        source,
        database,
        physical_name,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// A table bound to an alias in the statement being built
struct Bound<'a> {
    schema: &'a TableSchema,
    alias: String,
}

struct Lowered {
    parts: SqlParts,
    columns: Vec<ColumnMeta>,
    column_access: HashMap<String, EffectiveColumnAccess>,
    aggregation_aliases: HashSet<String>,
    output_columns: Vec<String>,
}

struct Lowering<'a> {
    snapshot: &'a RegistrySnapshot,
    plan: &'a QueryPlan,
    access: &'a HashMap<String, EffectiveTableAccess>,
    params: Vec<Value>,
    next_subquery: usize,
}

impl<'a> Lowering<'a> {
    fn lower(
        &mut self,
        definition: &QueryDefinition,
        root: &'a TableSchema,
        joined: &[&'a TableSchema],
    ) -> Result<Lowered> {
        let mut bound = vec![Bound {
            schema: root,
            alias: "t0".to_string(),
        }];
        let mut joins = Vec::with_capacity(joined.len());
        for (idx, &table) in joined.iter().enumerate() {
            let alias = format!("t{}", idx + 1);
            let (left_column, right_column) = self.join_columns(&bound, table, &alias)?;
            joins.push(JoinClause {
                kind: match definition.joins[idx].join_type {
                    JoinType::Inner => JoinKind::Inner,
                    JoinType::Left => JoinKind::Left,
                },
                table: self.table_ref(table, &alias),
                left_column,
                right_column,
            });
            bound.push(Bound {
                schema: table,
                alias,
            });
        }
        let scope: Vec<&Bound> = bound.iter().collect();

        let mut parts = SqlParts::new(self.table_ref(root, "t0"));
        parts.joins = joins;
        parts.distinct = definition.distinct;
        parts.count_mode = definition.execute_mode == ExecuteMode::Count;
        parts.limit = definition.limit;
        parts.offset = definition.offset;

        let aggregation_aliases: HashSet<String> = definition
            .aggregations
            .iter()
            .map(|a| a.alias.clone())
            .collect();

        // Select list
        let mut columns = Vec::new();
        let mut column_access = HashMap::new();
        let mut output_columns = Vec::new();

        let root_columns: Vec<String> = match &definition.columns {
            Some(names) => names.clone(),
            None if !definition.aggregations.is_empty() => definition
                .group_by
                .iter()
                .filter(|g| g.table.is_none())
                .map(|g| g.column.clone())
                .collect(),
            None => self
                .table_access(root)?
                .columns
                .iter()
                .filter(|c| c.allowed)
                .map(|c| c.api_name.clone())
                .collect(),
        };
        for name in &root_columns {
            let (column, schema) = self.resolve(&scope, 0, None, name)?;
            self.push_output(root, schema, name.clone(), &mut columns, &mut column_access)?;
            parts.select.push(SelectItem::aliased(column, name.clone()));
            output_columns.push(name.clone());
        }
        for (idx, join) in definition.joins.iter().enumerate() {
            let table = joined[idx];
            for name in join.columns.iter().flatten() {
                let (column, schema) = self.resolve(&scope, idx + 1, None, name)?;
                let output = format!("{}.{}", table.api_name, name);
                self.push_output(table, schema, output.clone(), &mut columns, &mut column_access)?;
                parts.select.push(SelectItem::aliased(column, output));
            }
        }

        // Where
        let mut predicates = Vec::new();
        for node in &definition.filters {
            predicates.push(self.lower_filter(node, &scope, 0)?);
        }
        for (idx, join) in definition.joins.iter().enumerate() {
            for node in &join.filters {
                predicates.push(self.lower_filter(node, &scope, idx + 1)?);
            }
        }
        if let Some(ids) = &definition.by_ids {
            predicates.push(self.by_ids_condition(root, ids)?);
        }
        parts.where_clause = match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(WhereNode::Group(WhereGroup {
                logic: Logic::And,
                not: false,
                conditions: predicates,
            })),
        };

        // Grouping and aggregation
        for group in &definition.group_by {
            let (column, _) = self.resolve(&scope, 0, group.table.as_deref(), &group.column)?;
            parts.group_by.push(column);
        }
        let mut seen_aliases = HashSet::new();
        for agg in &definition.aggregations {
            // Aggregated values are never masked, so an alias must not shadow a column
            if column_access.contains_key(&agg.alias) || !seen_aliases.insert(agg.alias.as_str()) {
                return Err(QueryError::Validation(format!(
                    "Aggregation alias {} collides with another output column",
                    agg.alias
                )));
            }
            let (target, source_type) = if agg.column == "*" {
                (AggregationTarget::Star, ColumnType::Scalar(ScalarType::Int))
            } else {
                let (column, schema) = self.resolve(&scope, 0, agg.table.as_deref(), &agg.column)?;
                (AggregationTarget::Column(column), schema.column_type)
            };
            let column_type = match agg.function {
                AggregateFn::Count => ColumnType::Scalar(ScalarType::Int),
                AggregateFn::Sum | AggregateFn::Avg => ColumnType::Scalar(ScalarType::Decimal),
                AggregateFn::Min | AggregateFn::Max => source_type,
            };
            columns.push(ColumnMeta {
                api_name: agg.alias.clone(),
                column_type,
                nullable: agg.function != AggregateFn::Count,
                from_table: root.api_name.clone(),
                masked: false,
            });
            parts.aggregations.push(Aggregation {
                function: agg.function.as_str().to_string(),
                target,
                alias: agg.alias.clone(),
            });
        }

        if !definition.having.is_empty() {
            let mut nodes = definition
                .having
                .iter()
                .map(|node| self.lower_having(node, &aggregation_aliases))
                .collect::<Result<Vec<_>>>()?;
            parts.having = if nodes.len() == 1 {
                nodes.pop()
            } else {
                Some(HavingNode::Group {
                    logic: Logic::And,
                    not: false,
                    conditions: nodes,
                })
            };
        }

        for order in &definition.order_by {
            let target = if order.table.is_none() && aggregation_aliases.contains(&order.column) {
                OrderTarget::Alias(order.column.clone())
            } else {
                let (column, _) = self.resolve(&scope, 0, order.table.as_deref(), &order.column)?;
                OrderTarget::Column(column)
            };
            parts.order_by.push(OrderByItem {
                target,
                direction: order.direction,
            });
        }

        Ok(Lowered {
            parts,
            columns,
            column_access,
            aggregation_aliases,
            output_columns,
        })
    }

    fn table_access(&self, table: &TableSchema) -> Result<&'a EffectiveTableAccess> {
        self.access.get(&table.id).ok_or_else(|| {
            QueryError::Internal(format!("Access for table {} was not resolved", table.id))
        })
    }

    fn table_ref(&self, table: &TableSchema, alias: &str) -> TableRef {
        let physical = self
            .plan
            .table_override(&table.id)
            .unwrap_or(&table.physical_name);
        let table_ref = TableRef::new(physical, alias);
        match self.plan.catalog_for(&table.database) {
            Some(catalog) => table_ref.with_catalog(catalog),
            None => table_ref,
        }
    }

    fn push_output(
        &self,
        table: &TableSchema,
        schema: &ColumnSchema,
        output: String,
        columns: &mut Vec<ColumnMeta>,
        column_access: &mut HashMap<String, EffectiveColumnAccess>,
    ) -> Result<()> {
        let decision = self
            .table_access(table)?
            .column(&schema.api_name)
            .cloned()
            .ok_or_else(|| QueryError::Internal(format!("No access entry for {}", schema.api_name)))?;

        columns.push(ColumnMeta {
            api_name: output.clone(),
            column_type: schema.column_type,
            nullable: schema.nullable,
            from_table: table.api_name.clone(),
            masked: decision.masked,
        });
        column_access.insert(output, decision);
        Ok(())
    }

    /// Resolve a possibly table-qualified API column name
    ///
    /// Unqualified names resolve against `scope[default]`.
    fn resolve(
        &self,
        scope: &[&Bound<'a>],
        default: usize,
        table: Option<&str>,
        column: &str,
    ) -> Result<(ColumnRef, &'a ColumnSchema)> {
        let bound = match table {
            Some(name) => scope
                .iter()
                .rev()
                .find(|b| b.schema.api_name == name)
                .ok_or_else(|| {
                    QueryError::Validation(format!("Table {} is not part of the query", name))
                })?,
            None => scope.get(default).ok_or_else(|| {
                QueryError::Internal(format!("No table bound at position {}", default))
            })?,
        };
        let schema: &'a TableSchema = bound.schema;

        let column_schema = schema.column(column).ok_or_else(|| {
            QueryError::Validation(format!("Unknown column {}.{}", schema.api_name, column))
        })?;
        if !self.table_access(schema)?.is_column_allowed(column) {
            return Err(QueryError::AccessDenied {
                table: schema.api_name.clone(),
                column: Some(column.to_string()),
            });
        }

        Ok((
            ColumnRef::new(bound.alias.clone(), column_schema.physical_name.clone()),
            column_schema,
        ))
    }

    /// Equality columns linking `table` to the first bound table related to it
    fn join_columns(
        &self,
        bound: &[Bound<'a>],
        table: &TableSchema,
        alias: &str,
    ) -> Result<(ColumnRef, ColumnRef)> {
        for outer in bound {
            if let Some((outer_col, inner_col)) = relation_between(outer.schema, table)? {
                return Ok((
                    ColumnRef::new(outer.alias.clone(), outer_col),
                    ColumnRef::new(alias, inner_col),
                ));
            }
        }
        Err(QueryError::Validation(format!(
            "No relation links {} to the query",
            table.api_name
        )))
    }

    fn push_param(&mut self, value: Value) -> usize {
        self.params.push(value);
        self.params.len() - 1
    }

    fn lower_filter(
        &mut self,
        node: &QueryFilterNode,
        scope: &[&Bound<'a>],
        default: usize,
    ) -> Result<WhereNode> {
        match node {
            QueryFilterNode::Filter(filter) => self.lower_condition(filter, scope, default),
            QueryFilterNode::ColumnCompare(cmp) => {
                let (left_column, _) = self.resolve(scope, default, cmp.table.as_deref(), &cmp.column)?;
                let (right_column, _) =
                    self.resolve(scope, default, cmp.ref_table.as_deref(), &cmp.ref_column)?;
                Ok(WhereNode::ColumnCompare(WhereColumnCondition {
                    left_column,
                    operator: cmp.operator,
                    right_column,
                }))
            }
            QueryFilterNode::Group(group) => {
                let conditions = group
                    .conditions
                    .iter()
                    .map(|child| self.lower_filter(child, scope, default))
                    .collect::<Result<Vec<_>>>()?;
                Ok(WhereNode::Group(WhereGroup {
                    logic: group.logic,
                    not: group.not,
                    conditions,
                }))
            }
            QueryFilterNode::Exists(exists) => self.lower_exists(exists, scope, default),
        }
    }

    fn lower_exists(
        &mut self,
        exists: &QueryExistsFilter,
        scope: &[&Bound<'a>],
        default: usize,
    ) -> Result<WhereNode> {
        let outer = scope.get(default).ok_or_else(|| {
            QueryError::Internal(format!("No table bound at position {}", default))
        })?;
        let target = lookup_table(self.snapshot, &exists.table)?;
        let (outer_col, inner_col) = relation_between(outer.schema, target)?.ok_or_else(|| {
            QueryError::Validation(format!(
                "No relation links {} to {}",
                outer.schema.api_name, target.api_name
            ))
        })?;

        let alias = format!("s{}", self.next_subquery);
        self.next_subquery += 1;
        let inner = Bound {
            schema: target,
            alias: alias.clone(),
        };

        let mut inner_scope: Vec<&Bound<'a>> = scope.to_vec();
        inner_scope.push(&inner);
        let inner_default = inner_scope.len() - 1;

        let mut predicates = exists
            .filters
            .iter()
            .map(|node| self.lower_filter(node, &inner_scope, inner_default))
            .collect::<Result<Vec<_>>>()?;
        let where_clause = match predicates.len() {
            0 => None,
            1 => predicates.pop().map(Box::new),
            _ => Some(Box::new(WhereNode::Group(WhereGroup {
                logic: Logic::And,
                not: false,
                conditions: predicates,
            }))),
        };

        let subquery = CorrelatedSubquery {
            from: self.table_ref(target, &alias),
            join: Correlation {
                left_column: ColumnRef::new(outer.alias.clone(), outer_col),
                right_column: ColumnRef::new(alias, inner_col),
            },
            where_clause,
        };

        Ok(match &exists.count {
            Some(count) => WhereNode::CountedSubquery(WhereCountedSubquery {
                subquery,
                operator: count.operator,
                count_param_index: self.push_param(Value::from(count.value)),
            }),
            None => WhereNode::Exists(WhereExists {
                exists: exists.exists,
                subquery,
            }),
        })
    }

    fn lower_condition(
        &mut self,
        filter: &QueryFilter,
        scope: &[&Bound<'a>],
        default: usize,
    ) -> Result<WhereNode> {
        let (column, schema) = self.resolve(scope, default, filter.table.as_deref(), &filter.column)?;
        let value = || {
            filter.value.clone().ok_or_else(|| {
                QueryError::Validation(format!("Filter on {} requires a value", filter.column))
            })
        };

        let simple = |operator: WhereOperator, param_index: Option<usize>| {
            WhereNode::Condition(WhereCondition {
                column: column.clone(),
                operator,
                param_index,
                column_type: Some(schema.column_type),
            })
        };

        let node = match filter.operator {
            FilterOperator::IsNull => simple(WhereOperator::IsNull, None),
            FilterOperator::IsNotNull => simple(WhereOperator::IsNotNull, None),
            FilterOperator::In | FilterOperator::NotIn => {
                let list = value()?;
                if !list.is_array() {
                    return Err(QueryError::Validation(format!(
                        "Filter on {} expects a list",
                        filter.column
                    )));
                }
                let operator = if filter.operator == FilterOperator::In {
                    WhereOperator::In
                } else {
                    WhereOperator::NotIn
                };
                simple(operator, Some(self.push_param(list)))
            }
            FilterOperator::Between | FilterOperator::NotBetween => {
                let (from, to) = between_bounds(&filter.column, value()?)?;
                WhereNode::Between(WhereBetween {
                    column: column.clone(),
                    not: filter.operator == FilterOperator::NotBetween,
                    from_param_index: self.push_param(from),
                    to_param_index: self.push_param(to),
                })
            }
            FilterOperator::LevenshteinLte => {
                let raw = value()?;
                let text = raw.get("text").cloned();
                let max = raw.get("maxDistance").cloned();
                let (text, max) = match (text, max) {
                    (Some(text), Some(max)) => (text, max),
                    _ => {
                        return Err(QueryError::Validation(format!(
                            "Filter on {} expects {{ text, maxDistance }}",
                            filter.column
                        )))
                    }
                };
                WhereNode::Function(WhereFunction {
                    function: FUZZY_FUNCTION.to_string(),
                    column: column.clone(),
                    fn_param_index: self.push_param(text),
                    operator: CompareOp::Lte,
                    compare_param_index: self.push_param(max),
                })
            }
            FilterOperator::ArrayContains
            | FilterOperator::ArrayContainsAll
            | FilterOperator::ArrayContainsAny
            | FilterOperator::ArrayIsEmpty
            | FilterOperator::ArrayIsNotEmpty => {
                if !schema.column_type.is_array() {
                    return Err(QueryError::Validation(format!(
                        "Column {} is not an array",
                        filter.column
                    )));
                }
                let (operator, values) = match filter.operator {
                    FilterOperator::ArrayContains => (ArrayOperator::Contains, vec![value()?]),
                    FilterOperator::ArrayContainsAll => {
                        (ArrayOperator::ContainsAll, list_values(&filter.column, value()?)?)
                    }
                    FilterOperator::ArrayContainsAny => {
                        (ArrayOperator::ContainsAny, list_values(&filter.column, value()?)?)
                    }
                    FilterOperator::ArrayIsEmpty => (ArrayOperator::IsEmpty, vec![]),
                    _ => (ArrayOperator::IsNotEmpty, vec![]),
                };
                let param_indexes = values.into_iter().map(|v| self.push_param(v)).collect();
                WhereNode::Array(WhereArrayCondition {
                    column: column.clone(),
                    operator,
                    param_indexes,
                    element_type: schema.column_type.scalar(),
                })
            }
            other => {
                let operator = match other {
                    FilterOperator::Like => WhereOperator::Like,
                    FilterOperator::NotLike => WhereOperator::NotLike,
                    FilterOperator::Ilike => WhereOperator::Ilike,
                    FilterOperator::NotIlike => WhereOperator::NotIlike,
                    FilterOperator::Contains => WhereOperator::Contains,
                    FilterOperator::Icontains => WhereOperator::Icontains,
                    FilterOperator::NotContains => WhereOperator::NotContains,
                    FilterOperator::NotIcontains => WhereOperator::NotIcontains,
                    FilterOperator::StartsWith => WhereOperator::StartsWith,
                    FilterOperator::IstartsWith => WhereOperator::IstartsWith,
                    FilterOperator::EndsWith => WhereOperator::EndsWith,
                    FilterOperator::IendsWith => WhereOperator::IendsWith,
                    compare => WhereOperator::Compare(compare.as_compare().ok_or_else(|| {
                        QueryError::Internal(format!("Unhandled filter operator {:?}", compare))
                    })?),
                };
                let index = self.push_param(value()?);
                simple(operator, Some(index))
            }
        };
        Ok(node)
    }

    fn lower_having(
        &mut self,
        node: &HavingFilterNode,
        aliases: &HashSet<String>,
    ) -> Result<HavingNode> {
        match node {
            HavingFilterNode::Group(group) => {
                let conditions = group
                    .conditions
                    .iter()
                    .map(|child| self.lower_having(child, aliases))
                    .collect::<Result<Vec<_>>>()?;
                Ok(HavingNode::Group {
                    logic: group.logic,
                    not: group.not,
                    conditions,
                })
            }
            HavingFilterNode::Filter(filter) => {
                if !aliases.contains(&filter.column) {
                    return Err(QueryError::Validation(format!(
                        "HAVING references unknown aggregation {}",
                        filter.column
                    )));
                }
                let value = filter.value.clone().ok_or_else(|| {
                    QueryError::Validation(format!("HAVING on {} requires a value", filter.column))
                })?;

                match filter.operator {
                    FilterOperator::Between | FilterOperator::NotBetween => {
                        let (from, to) = between_bounds(&filter.column, value)?;
                        Ok(HavingNode::Between {
                            alias: filter.column.clone(),
                            not: filter.operator == FilterOperator::NotBetween,
                            from_param_index: self.push_param(from),
                            to_param_index: self.push_param(to),
                        })
                    }
                    other => {
                        let operator = other.as_compare().ok_or_else(|| {
                            QueryError::Validation(format!(
                                "Operator {:?} is not supported in HAVING",
                                other
                            ))
                        })?;
                        Ok(HavingNode::Condition {
                            alias: filter.column.clone(),
                            operator,
                            param_index: self.push_param(value),
                        })
                    }
                }
            }
        }
    }

    fn by_ids_condition(&mut self, root: &TableSchema, ids: &[Value]) -> Result<WhereNode> {
        let pk = match root.primary_key.as_slice() {
            [single] => single,
            _ => {
                return Err(QueryError::Validation(format!(
                    "byIds requires a single-column primary key on {}",
                    root.api_name
                )))
            }
        };
        let schema = root.column(pk).ok_or_else(|| {
            QueryError::Validation(format!("Primary key {} is not a column of {}", pk, root.api_name))
        })?;

        Ok(WhereNode::Condition(WhereCondition {
            column: ColumnRef::new("t0", schema.physical_name.clone()),
            operator: WhereOperator::In,
            param_index: Some(self.push_param(Value::Array(ids.to_vec()))),
            column_type: Some(schema.column_type),
        }))
    }
}

/// Physical `(a column, b column)` of a declared relation in either direction
fn relation_between(a: &TableSchema, b: &TableSchema) -> Result<Option<(String, String)>> {
    let pair = a
        .relations
        .iter()
        .find(|r| r.references.table == b.id)
        .map(|r| (r.column.as_str(), r.references.column.as_str()))
        .or_else(|| {
            b.relations
                .iter()
                .find(|r| r.references.table == a.id)
                .map(|r| (r.references.column.as_str(), r.column.as_str()))
        });

    let (a_col, b_col) = match pair {
        Some(pair) => pair,
        None => return Ok(None),
    };
    let physical = |table: &TableSchema, api: &str| {
        table
            .column(api)
            .map(|c| c.physical_name.clone())
            .ok_or_else(|| {
                QueryError::Validation(format!("Relation column {}.{} does not exist", table.api_name, api))
            })
    };

    Ok(Some((physical(a, a_col)?, physical(b, b_col)?)))
}

fn between_bounds(column: &str, value: Value) -> Result<(Value, Value)> {
    match value {
        Value::Array(mut items) if items.len() == 2 => {
            let to = items.pop().unwrap_or(Value::Null);
            let from = items.pop().unwrap_or(Value::Null);
            Ok((from, to))
        }
        Value::Object(mut map) if map.contains_key("from") && map.contains_key("to") => Ok((
            map.remove("from").unwrap_or(Value::Null),
            map.remove("to").unwrap_or(Value::Null),
        )),
        _ => Err(QueryError::Validation(format!(
            "Filter on {} expects [from, to] bounds",
            column
        ))),
    }
}

fn list_values(column: &str, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(QueryError::Validation(format!(
            "Filter on {} expects a list",
            column
        ))),
    }
}
