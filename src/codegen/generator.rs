//! Schema-inferring code generator.

use std::collections::BTreeMap;

use tracing::debug;

use super::error::CodegenError;
use super::{CodeGenerator, FnInfo};
use crate::catalog::{ColumnDef, DataType, NamedSchema, Schema};
use crate::planner::SchemasContext;
use crate::sql::{AllExpr, BinaryOperator, Expr, FnDef, LiteralValue, UnaryOperator};

const FN_PREFIX: &str = "__internal_sql_codegen_";

/// Validates expressions and infers their result types.
///
/// Every successful [`compile`](CodeGenerator::compile) mints a fresh
/// function name; user functions are kept by name with their return type.
#[derive(Debug, Default)]
pub struct SchemaCodeGenerator {
    next_id: usize,
    functions: BTreeMap<String, FnDef>,
}

impl SchemaCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of functions generated so far.
    pub fn generated(&self) -> usize {
        self.next_id
    }

    pub fn function(&self, name: &str) -> Option<&FnDef> {
        self.functions.get(name)
    }

    fn infer(
        &self,
        ctx: &SchemasContext<'_>,
        expr: &Expr,
        row_mode: bool,
    ) -> Result<DataType, CodegenError> {
        match expr {
            Expr::Column(col) => ctx
                .column_type(col)
                .ok_or_else(|| CodegenError::UnresolvedColumn(col.to_string())),
            Expr::Literal(lit) => Ok(match lit {
                LiteralValue::Null | LiteralValue::Boolean(_) => DataType::Bool,
                LiteralValue::Integer(_) => DataType::Int64,
                LiteralValue::Float(_) => DataType::Double,
                LiteralValue::String(_) => DataType::String,
            }),
            Expr::BinaryOp { left, op, right } => {
                let lt = self.infer(ctx, left, row_mode)?;
                let rt = self.infer(ctx, right, row_mode)?;
                if op.is_comparison() || op.is_logical() {
                    return Ok(DataType::Bool);
                }
                match op {
                    BinaryOperator::Concat => Ok(DataType::String),
                    BinaryOperator::Divide if lt.is_numeric() && rt.is_numeric() => {
                        Ok(DataType::Double)
                    }
                    _ => widen(lt, rt).ok_or_else(|| {
                        CodegenError::invalid_expr(expr, format!("cannot apply to {} and {}", lt, rt))
                    }),
                }
            }
            Expr::UnaryOp { op, expr: inner } => {
                let t = self.infer(ctx, inner, row_mode)?;
                match op {
                    UnaryOperator::Not => Ok(DataType::Bool),
                    _ if t.is_numeric() => Ok(t),
                    _ => Err(CodegenError::invalid_expr(expr, format!("{} is not numeric", t))),
                }
            }
            Expr::Nested(inner) => self.infer(ctx, inner, row_mode),
            Expr::Function { name, args } => self.infer_call(ctx, expr, name, args, row_mode),
            Expr::All(_) => Err(CodegenError::invalid_expr(
                expr,
                "wildcard is only allowed as a projection",
            )),
        }
    }

    fn infer_call(
        &self,
        ctx: &SchemasContext<'_>,
        expr: &Expr,
        name: &str,
        args: &[Expr],
        row_mode: bool,
    ) -> Result<DataType, CodegenError> {
        let lowered = name.to_lowercase();
        if crate::sql::is_aggregate_function(&lowered) {
            if row_mode {
                return Err(CodegenError::invalid_expr(
                    expr,
                    "aggregate function in row expression",
                ));
            }
            if lowered == "count" {
                for arg in args.iter().filter(|a| !matches!(a, Expr::All(_))) {
                    self.infer(ctx, arg, true)?;
                }
                return Ok(DataType::Int64);
            }
            let [arg] = args else {
                return Err(CodegenError::invalid_expr(expr, "expects one argument"));
            };
            let t = self.infer(ctx, arg, true)?;
            return match lowered.as_str() {
                "avg" => Ok(DataType::Double),
                "sum" if !t.is_numeric() => {
                    Err(CodegenError::invalid_expr(expr, format!("{} is not numeric", t)))
                }
                _ => Ok(t),
            };
        }

        let def = self
            .functions
            .get(name)
            .ok_or_else(|| CodegenError::UnknownFunction(name.to_string()))?;
        if def.args.len() != args.len() {
            return Err(CodegenError::invalid_expr(
                expr,
                format!("expects {} arguments, got {}", def.args.len(), args.len()),
            ));
        }
        for arg in args {
            self.infer(ctx, arg, row_mode)?;
        }
        Ok(def.return_type)
    }
}

impl CodeGenerator for SchemaCodeGenerator {
    fn compile(
        &mut self,
        inputs: &[NamedSchema],
        exprs: &[(String, Expr)],
        row_mode: bool,
    ) -> Result<FnInfo, CodegenError> {
        if exprs.is_empty() {
            return Err(CodegenError::EmptyExprList);
        }

        let ctx = SchemasContext::new(inputs);
        let mut schema = Schema::default();
        for (name, expr) in exprs {
            if let Expr::All(all) = expr {
                for (column, data_type) in wildcard_columns(&ctx, inputs, all)? {
                    schema.push(ColumnDef::new(column, data_type));
                }
                continue;
            }
            let data_type = self.infer(&ctx, expr, row_mode)?;
            schema.push(ColumnDef::new(name.clone(), data_type));
        }

        let fn_name = format!("{}{}", FN_PREFIX, self.next_id);
        self.next_id += 1;
        debug!(fn_name = %fn_name, outputs = schema.len(), "compiled expression list");
        Ok(FnInfo::new(fn_name, schema))
    }

    fn compile_function(&mut self, def: &FnDef) -> Result<(), CodegenError> {
        if self.functions.contains_key(&def.name) {
            return Err(CodegenError::InvalidFunction {
                name: def.name.clone(),
                reason: "function already defined".into(),
            });
        }

        let params = [NamedSchema::new("", Schema::new(def.args.clone()))];
        let ctx = SchemasContext::new(&params);
        let body_type = self
            .infer(&ctx, &def.body, true)
            .map_err(|e| CodegenError::InvalidFunction {
                name: def.name.clone(),
                reason: e.to_string(),
            })?;
        let compatible = body_type == def.return_type
            || (body_type.is_numeric() && def.return_type.is_numeric());
        if !compatible {
            return Err(CodegenError::InvalidFunction {
                name: def.name.clone(),
                reason: format!("body returns {}, declared {}", body_type, def.return_type),
            });
        }

        debug!(name = %def.name, "registered function");
        self.functions.insert(def.name.clone(), def.clone());
        Ok(())
    }
}

/// Columns produced by a wildcard, expanding it against `inputs` if needed.
fn wildcard_columns(
    ctx: &SchemasContext<'_>,
    inputs: &[NamedSchema],
    all: &AllExpr,
) -> Result<Vec<(String, DataType)>, CodegenError> {
    if all.is_expanded() {
        return all
            .expanded
            .iter()
            .map(|col| {
                ctx.column_type(col)
                    .map(|t| (col.column.clone(), t))
                    .ok_or_else(|| CodegenError::UnresolvedColumn(col.to_string()))
            })
            .collect();
    }

    let columns: Vec<(String, DataType)> = inputs
        .iter()
        .filter(|named| match all.relation.as_deref() {
            Some(relation) if !relation.is_empty() => named.relation == relation,
            _ => true,
        })
        .flat_map(|named| named.schema.columns())
        .map(|c| (c.name.clone(), c.data_type))
        .collect();
    if columns.is_empty() {
        return Err(CodegenError::invalid_expr(
            Expr::All(all.clone()),
            "matches no input columns",
        ));
    }
    Ok(columns)
}

fn numeric_rank(t: DataType) -> Option<u8> {
    match t {
        DataType::Int16 => Some(0),
        DataType::Int32 => Some(1),
        DataType::Int64 => Some(2),
        DataType::Float => Some(3),
        DataType::Double => Some(4),
        _ => None,
    }
}

fn widen(a: DataType, b: DataType) -> Option<DataType> {
    let (ra, rb) = (numeric_rank(a)?, numeric_rank(b)?);
    Some(if ra >= rb { a } else { b })
}
