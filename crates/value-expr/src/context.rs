// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Value expression context: a base path plus the chain of containers
//! walked from the root to reach it, used to resolve relative property
//! references (including `^.` parent-ups) into absolute paths.

use crate::error::{ExprError, ExprResult};

/// Tells an [`ExprContext`] whether a given absolute property path is a
/// container (object or reference) that a reference may walk through.
/// Implemented downstream against the real schema (`prop-tree`); kept as
/// a trait here so this crate stays schema-agnostic.
pub trait ContainerResolver {
    fn is_container(&self, absolute_path: &str) -> bool;
}

/// A resolver that treats every path as a container. Useful for tests and
/// for contexts built against data models with no leaf/container
/// distinction worth enforcing at this layer.
pub struct PermissiveResolver;

impl ContainerResolver for PermissiveResolver {
    fn is_container(&self, _absolute_path: &str) -> bool {
        true
    }
}

/// `(base-path, container-chain)`: resolves relative property references
/// of the form `(^.)*name(.name)*` into absolute paths.
pub struct ExprContext<'a> {
    base_path: String,
    /// Absolute paths of every container from the root down to (and
    /// including) `base_path`, root first.
    container_chain: Vec<String>,
    resolver: &'a dyn ContainerResolver,
}

impl<'a> ExprContext<'a> {
    /// A context rooted at the record type itself (empty base path, a
    /// single-element chain holding the root).
    pub fn root(resolver: &'a dyn ContainerResolver) -> Self {
        Self {
            base_path: String::new(),
            container_chain: vec![String::new()],
            resolver,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn container_chain(&self) -> &[String] {
        &self.container_chain
    }

    fn join(base: &str, rest: &str) -> String {
        if base.is_empty() {
            rest.to_string()
        } else {
            format!("{base}.{rest}")
        }
    }

    /// Resolves `r = (^.)*name(.name)*` against this context. Each leading
    /// `^.` pops one container off the chain; popping past the root is an
    /// `InvalidReference` error.
    pub fn normalize(&self, r: &str) -> ExprResult<String> {
        let mut rest = r;
        let mut pops = 0usize;
        while let Some(stripped) = rest.strip_prefix("^.") {
            pops += 1;
            rest = stripped;
        }
        if rest.is_empty() {
            return Err(ExprError::InvalidReference {
                reference: r.to_string(),
                reason: "missing property name after parent-up markers".to_string(),
            });
        }
        if pops >= self.container_chain.len() {
            return Err(ExprError::InvalidReference {
                reference: r.to_string(),
                reason: format!(
                    "{pops} parent-up marker(s) exceed container chain depth {depth}",
                    depth = self.container_chain.len() - 1
                ),
            });
        }
        let base_index = self.container_chain.len() - 1 - pops;
        let base = &self.container_chain[base_index];
        Ok(Self::join(base, rest))
    }

    /// Returns a new context rooted at the property `r` resolves to.
    /// Fails if any intermediate segment of `r` (beyond the first) is not
    /// itself a container, since only containers can be walked through.
    pub fn relative(&self, r: &str) -> ExprResult<ExprContext<'a>> {
        let mut rest = r;
        let mut pops = 0usize;
        while let Some(stripped) = rest.strip_prefix("^.") {
            pops += 1;
            rest = stripped;
        }
        if pops >= self.container_chain.len() {
            return Err(ExprError::InvalidReference {
                reference: r.to_string(),
                reason: format!(
                    "{pops} parent-up marker(s) exceed container chain depth {depth}",
                    depth = self.container_chain.len() - 1
                ),
            });
        }
        let base_index = self.container_chain.len() - 1 - pops;
        let mut chain = self.container_chain[..=base_index].to_vec();
        let mut current = chain[base_index].clone();

        let segments: Vec<&str> = rest.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            let next = Self::join(&current, segment);
            let is_last = i == segments.len() - 1;
            if !is_last && !self.resolver.is_container(&next) {
                return Err(ExprError::NotAContainer(next));
            }
            current = next;
            chain.push(current.clone());
        }

        Ok(ExprContext {
            base_path: current,
            container_chain: chain,
            resolver: self.resolver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_ctx() -> ExprContext<'static> {
        static RESOLVER: PermissiveResolver = PermissiveResolver;
        ExprContext::root(&RESOLVER)
    }

    #[test]
    fn normalize_simple_path() {
        let ctx = root_ctx();
        assert_eq!(ctx.normalize("name").unwrap(), "name");
        assert_eq!(ctx.normalize("address.city").unwrap(), "address.city");
    }

    #[test]
    fn relative_then_normalize_nested() {
        let ctx = root_ctx();
        let inner = ctx.relative("address").unwrap();
        assert_eq!(inner.base_path(), "address");
        assert_eq!(inner.normalize("city").unwrap(), "address.city");
    }

    #[test]
    fn parent_up_pops_one_container() {
        let ctx = root_ctx();
        let inner = ctx.relative("address").unwrap();
        // from address, ^.siblingProp should resolve relative to the root again
        assert_eq!(inner.normalize("^.name").unwrap(), "name");
    }

    #[test]
    fn parent_up_past_root_is_an_error() {
        let ctx = root_ctx();
        assert!(ctx.normalize("^.name").is_err());
    }

    #[test]
    fn relative_base_path_matches_normalize() {
        let ctx = root_ctx();
        let inner = ctx.relative("address.city").unwrap();
        assert_eq!(inner.base_path(), ctx.normalize("address.city").unwrap());
    }

    struct LeafAfterAddress;
    impl ContainerResolver for LeafAfterAddress {
        fn is_container(&self, path: &str) -> bool {
            path != "address"
        }
    }

    #[test]
    fn relative_rejects_non_container_intermediate_segment() {
        let resolver = LeafAfterAddress;
        let ctx = ExprContext::root(&resolver);
        let err = ctx.relative("address.city").unwrap_err();
        assert!(matches!(err, ExprError::NotAContainer(_)));
    }
}
