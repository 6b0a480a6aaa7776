// IR to SQL text
//
// One walker shared by every dialect. Output parameters are appended in the
// order placeholders are emitted, so numbering is dense and 1-based no
// matter how the IR indexes its inputs.

use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::models::{
    Aggregation, AggregationTarget, ArrayOperator, ColumnRef, CorrelatedSubquery, HavingNode,
    JoinClause, OrderTarget, SqlParts, TableRef, WhereArrayCondition, WhereCondition, WhereNode,
    WhereOperator,
};

use super::dialect::{into_list, ParamSink, SqlDialect};
use super::fragments::{quote_ident, quote_qualified, safe_agg_fn, safe_where_fn};

pub struct SqlBuilder<'a> {
    dialect: &'a dyn SqlDialect,
    inputs: &'a [Value],
    params: ParamSink,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, inputs: &'a [Value]) -> Self {
        Self {
            dialect,
            inputs,
            params: ParamSink::new(),
        }
    }

    /// Render the full statement, consuming the builder
    pub fn build(mut self, parts: &SqlParts) -> Result<(String, Vec<Value>)> {
        let mut clauses = vec![self.select_clause(parts)];

        clauses.push(format!("FROM {}", self.table(&parts.from)));
        for join in &parts.joins {
            clauses.push(self.join(join));
        }

        if let Some(node) = &parts.where_clause {
            let predicate = self.where_node(node)?;
            clauses.push(format!("WHERE {}", predicate));
        }

        if !parts.group_by.is_empty() {
            let columns: Vec<String> = parts.group_by.iter().map(|c| self.column(c)).collect();
            clauses.push(format!("GROUP BY {}", columns.join(", ")));
        }

        if let Some(node) = &parts.having {
            let predicate = self.having_node(node)?;
            clauses.push(format!("HAVING {}", predicate));
        }

        if !parts.order_by.is_empty() {
            let items: Vec<String> = parts
                .order_by
                .iter()
                .map(|item| {
                    let target = match &item.target {
                        OrderTarget::Column(c) => self.column(c),
                        OrderTarget::Alias(alias) => self.ident(alias),
                    };
                    format!("{} {}", target, item.direction.as_sql())
                })
                .collect();
            clauses.push(format!("ORDER BY {}", items.join(", ")));
        }

        if let Some(pagination) = self.dialect.render_pagination(parts.limit, parts.offset) {
            clauses.push(pagination);
        }

        Ok((clauses.join(" "), self.params.into_values()))
    }

    fn select_clause(&self, parts: &SqlParts) -> String {
        if parts.count_mode {
            return "SELECT COUNT(*)".to_string();
        }

        let mut items: Vec<String> = parts
            .select
            .iter()
            .map(|item| match &item.alias {
                Some(alias) => format!("{} AS {}", self.column(&item.column), self.ident(alias)),
                None => self.column(&item.column),
            })
            .collect();
        items.extend(parts.aggregations.iter().map(|agg| self.aggregation(agg)));

        let list = if items.is_empty() {
            "*".to_string()
        } else {
            items.join(", ")
        };
        if parts.distinct {
            format!("SELECT DISTINCT {}", list)
        } else {
            format!("SELECT {}", list)
        }
    }

    fn aggregation(&self, agg: &Aggregation) -> String {
        let target = match &agg.target {
            AggregationTarget::Star => "*".to_string(),
            AggregationTarget::Column(c) => self.column(c),
        };
        format!("{}({}) AS {}", safe_agg_fn(&agg.function), target, self.ident(&agg.alias))
    }

    fn ident(&self, name: &str) -> String {
        quote_ident(name, self.dialect.quote_char())
    }

    fn column(&self, column: &ColumnRef) -> String {
        format!("{}.{}", self.ident(&column.table_alias), self.ident(&column.column_name))
    }

    fn table(&self, table: &TableRef) -> String {
        let quote = self.dialect.quote_char();
        let name = match (&table.catalog, self.dialect.supports_catalog()) {
            (Some(catalog), true) => format!(
                "{}.{}",
                quote_ident(catalog, quote),
                quote_qualified(&table.physical_name, quote)
            ),
            _ => quote_qualified(&table.physical_name, quote),
        };
        format!("{} AS {}", name, self.ident(&table.alias))
    }

    fn join(&self, join: &JoinClause) -> String {
        format!(
            "{} {} ON {} = {}",
            join.kind.as_sql(),
            self.table(&join.table),
            self.column(&join.left_column),
            self.column(&join.right_column)
        )
    }

    fn input(&self, index: usize) -> Result<Value> {
        self.inputs
            .get(index)
            .cloned()
            .ok_or(QueryError::MissingParameter { index })
    }

    fn bind(&mut self, index: usize) -> Result<String> {
        let value = self.input(index)?;
        Ok(self.dialect.placeholder(&mut self.params, value))
    }

    fn bind_value(&mut self, value: Value) -> String {
        self.dialect.placeholder(&mut self.params, value)
    }

    fn where_node(&mut self, node: &WhereNode) -> Result<String> {
        match node {
            WhereNode::Condition(cond) => self.condition(cond),
            WhereNode::ColumnCompare(cmp) => Ok(format!(
                "{} {} {}",
                self.column(&cmp.left_column),
                cmp.operator.as_sql(),
                self.column(&cmp.right_column)
            )),
            WhereNode::Between(between) => {
                let column = self.column(&between.column);
                let from = self.bind(between.from_param_index)?;
                let to = self.bind(between.to_param_index)?;
                let sql = format!("{} BETWEEN {} AND {}", column, from, to);
                Ok(if between.not {
                    format!("NOT ({})", sql)
                } else {
                    sql
                })
            }
            WhereNode::Array(array) => self.array_condition(array),
            WhereNode::Function(func) => {
                safe_where_fn(&func.function)?;
                let column = self.column(&func.column);
                let arg = self.bind(func.fn_param_index)?;
                let bound = self.input(func.compare_param_index)?;
                let bound = self.dialect.int_placeholder(&mut self.params, bound);
                Ok(format!(
                    "{}({}, {}) {} {}",
                    self.dialect.fuzzy_function(),
                    column,
                    arg,
                    func.operator.as_sql(),
                    bound
                ))
            }
            WhereNode::Group(group) => {
                let children = group
                    .conditions
                    .iter()
                    .map(|child| self.where_node(child))
                    .collect::<Result<Vec<_>>>()?;
                Ok(group_sql(group.logic.as_sql(), group.not, children))
            }
            WhereNode::Exists(exists) => {
                let body = self.subquery("1", &exists.subquery)?;
                let keyword = if exists.exists { "EXISTS" } else { "NOT EXISTS" };
                Ok(format!("{} ({})", keyword, body))
            }
            WhereNode::CountedSubquery(counted) => {
                let body = self.subquery("COUNT(*)", &counted.subquery)?;
                let placeholder = self.bind(counted.count_param_index)?;
                Ok(format!(
                    "({}) {} {}",
                    body,
                    counted.operator.as_sql(),
                    placeholder
                ))
            }
        }
    }

    fn subquery(&mut self, projection: &str, subquery: &CorrelatedSubquery) -> Result<String> {
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            projection,
            self.table(&subquery.from),
            self.column(&subquery.join.left_column),
            self.column(&subquery.join.right_column)
        );
        if let Some(inner) = &subquery.where_clause {
            let predicate = self.where_node(inner)?;
            sql.push_str(" AND ");
            sql.push_str(&predicate);
        }
        Ok(sql)
    }

    fn condition(&mut self, cond: &WhereCondition) -> Result<String> {
        let column = self.column(&cond.column);
        let value = match cond.operator {
            WhereOperator::IsNull | WhereOperator::IsNotNull => Value::Null,
            _ => {
                let index = cond.param_index.ok_or_else(|| {
                    QueryError::Validation(format!(
                        "Condition on {} requires a parameter",
                        cond.column.column_name
                    ))
                })?;
                self.input(index)?
            }
        };

        let sql = match cond.operator {
            WhereOperator::IsNull => format!("{} IS NULL", column),
            WhereOperator::IsNotNull => format!("{} IS NOT NULL", column),
            WhereOperator::Compare(op) => {
                format!("{} {} {}", column, op.as_sql(), self.bind_value(value))
            }
            WhereOperator::In | WhereOperator::NotIn => {
                let element = cond.column_type.map(|t| t.scalar());
                self.dialect.render_in(
                    &mut self.params,
                    &column,
                    into_list(value),
                    element,
                    cond.operator == WhereOperator::NotIn,
                )
            }
            WhereOperator::Like => format!("{} LIKE {}", column, self.bind_value(value)),
            WhereOperator::NotLike => format!("{} NOT LIKE {}", column, self.bind_value(value)),
            WhereOperator::Ilike => {
                let ph = self.bind_value(value);
                self.dialect.render_ilike(&column, &ph, false)
            }
            WhereOperator::NotIlike => {
                let ph = self.bind_value(value);
                self.dialect.render_ilike(&column, &ph, true)
            }
            WhereOperator::Contains => {
                let ph = self.bind_value(wrap(&value, "%", "%"));
                format!("{} LIKE {}", column, ph)
            }
            WhereOperator::NotContains => {
                let ph = self.bind_value(wrap(&value, "%", "%"));
                format!("{} NOT LIKE {}", column, ph)
            }
            WhereOperator::Icontains => {
                let ph = self.bind_value(wrap(&value, "%", "%"));
                self.dialect.render_ilike(&column, &ph, false)
            }
            WhereOperator::NotIcontains => {
                let ph = self.bind_value(wrap(&value, "%", "%"));
                self.dialect.render_ilike(&column, &ph, true)
            }
            WhereOperator::StartsWith => {
                let ph = self.bind_value(value);
                self.dialect.render_starts_with(&column, &ph)
            }
            WhereOperator::EndsWith => {
                let ph = self.bind_value(value);
                self.dialect.render_ends_with(&column, &ph)
            }
            WhereOperator::IstartsWith => {
                let ph = self.bind_value(wrap(&value, "", "%"));
                self.dialect.render_ilike(&column, &ph, false)
            }
            WhereOperator::IendsWith => {
                let ph = self.bind_value(wrap(&value, "%", ""));
                self.dialect.render_ilike(&column, &ph, false)
            }
        };
        Ok(sql)
    }

    fn array_condition(&mut self, array: &WhereArrayCondition) -> Result<String> {
        let column = self.column(&array.column);
        let values = array
            .param_indexes
            .iter()
            .map(|&idx| self.input(idx))
            .collect::<Result<Vec<_>>>()?;

        match array.operator {
            ArrayOperator::ContainsAll if values.is_empty() => return Ok("1 = 1".to_string()),
            ArrayOperator::Contains | ArrayOperator::ContainsAny if values.is_empty() => {
                return Ok("1 = 0".to_string())
            }
            _ => {}
        }

        Ok(self.dialect.render_array(
            &mut self.params,
            &column,
            array.operator,
            values,
            array.element_type,
        ))
    }

    fn having_node(&mut self, node: &HavingNode) -> Result<String> {
        match node {
            HavingNode::Condition {
                alias,
                operator,
                param_index,
            } => {
                let target = self.ident(alias);
                let ph = self.bind(*param_index)?;
                Ok(format!("{} {} {}", target, operator.as_sql(), ph))
            }
            HavingNode::Between {
                alias,
                not,
                from_param_index,
                to_param_index,
            } => {
                let target = self.ident(alias);
                let from = self.bind(*from_param_index)?;
                let to = self.bind(*to_param_index)?;
                let sql = format!("{} BETWEEN {} AND {}", target, from, to);
                Ok(if *not { format!("NOT ({})", sql) } else { sql })
            }
            HavingNode::Group {
                logic,
                not,
                conditions,
            } => {
                let children = conditions
                    .iter()
                    .map(|child| self.having_node(child))
                    .collect::<Result<Vec<_>>>()?;
                Ok(group_sql(logic.as_sql(), *not, children))
            }
        }
    }
}

/// Parenthesized AND/OR list; an empty group is the operator's identity
fn group_sql(logic: &str, not: bool, children: Vec<String>) -> String {
    let body = if children.is_empty() {
        let identity = if logic == "AND" { "1 = 1" } else { "1 = 0" };
        identity.to_string()
    } else {
        children.join(&format!(" {} ", logic))
    };
    if not {
        format!("NOT ({})", body)
    } else {
        format!("({})", body)
    }
}

/// Surround a pattern value with wildcards
fn wrap(value: &Value, prefix: &str, suffix: &str) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Value::String(format!("{}{}{}", prefix, text, suffix))
}
