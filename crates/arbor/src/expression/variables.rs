//! Variable scopes.
//!
//! A scope is any expression owning a `variables` map (process roots,
//! forgotten nodes, sub-process roots). Lookups walk the parent chain and
//! stop at the first scope holding the name; writes land in the nearest
//! scope.

use arbor_flow_core::{ExpressionRecord, Variables};
use chrono::Utc;
use serde_json::Value;

use super::{ExpressionError, FlowExpression};

impl FlowExpression<'_> {
    /// Ancestor records owning a scope, nearest first.
    async fn ancestor_scopes(&self) -> Result<Vec<ExpressionRecord>, ExpressionError> {
        let mut scopes = Vec::new();
        let mut next = self.record.parent_id.clone();
        while let Some(fei) = next {
            let Some(record) = self.ctx.storage.get_expression(&fei).await? else {
                break;
            };
            next = record.parent_id.clone();
            if record.variables.is_some() {
                scopes.push(record);
            }
        }
        Ok(scopes)
    }

    /// Every variable visible from this node, nearer scopes shadowing
    /// farther ones.
    pub async fn compile_variables(&self) -> Result<Variables, ExpressionError> {
        let mut compiled = Variables::new();
        for scope in self.ancestor_scopes().await?.into_iter().rev() {
            compiled.extend(scope.variables.unwrap_or_default());
        }
        if let Some(own) = &self.record.variables {
            compiled.extend(own.clone());
        }
        Ok(compiled)
    }

    pub async fn lookup_variable(&self, name: &str) -> Result<Option<Value>, ExpressionError> {
        if let Some(value) = self.record.variables.as_ref().and_then(|own| own.get(name)) {
            return Ok(Some(value.clone()));
        }
        for scope in self.ancestor_scopes().await? {
            if let Some(value) = scope.variables.as_ref().and_then(|vars| vars.get(name)) {
                return Ok(Some(value.clone()));
            }
        }
        Ok(None)
    }

    /// Bind `name` in the nearest scope, opening one on this node when no
    /// ancestor owns a scope.
    pub async fn set_variable(&mut self, name: &str, value: Value) -> Result<(), ExpressionError> {
        if self.record.variables.is_none()
            && let Some(mut scope) = self.ancestor_scopes().await?.into_iter().next()
        {
            scope
                .variables
                .get_or_insert_with(Variables::new)
                .insert(name.to_string(), value);
            scope.modified_at = Utc::now();
            self.ctx.storage.put_expression(&scope).await?;
            return Ok(());
        }

        self.record
            .variables
            .get_or_insert_with(Variables::new)
            .insert(name.to_string(), value);
        self.persist().await
    }

    /// Remove `name` from the nearest scope holding it.
    pub async fn unset_variable(&mut self, name: &str) -> Result<Option<Value>, ExpressionError> {
        if let Some(own) = self.record.variables.as_mut()
            && let Some(previous) = own.remove(name)
        {
            self.persist().await?;
            return Ok(Some(previous));
        }

        for mut scope in self.ancestor_scopes().await? {
            let Some(previous) = scope.variables.as_mut().and_then(|vars| vars.remove(name)) else {
                continue;
            };
            scope.modified_at = Utc::now();
            self.ctx.storage.put_expression(&scope).await?;
            return Ok(Some(previous));
        }
        Ok(None)
    }
}
