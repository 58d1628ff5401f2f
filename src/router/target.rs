use std::fmt;

use crate::CacheKey;
use crate::EntityKind;
use crate::Result;
use crate::RouterError;
use crate::RowFields;

/// One element of an invalidation target pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetSegment {
    /// Fixed text copied into the cache key verbatim.
    Literal(String),
    /// Placeholder substituted with the named column of the changed row.
    Column(String),
}

/// A cache-key pattern registered with a subscription.
///
/// Written as colon-separated segments, e.g. `workspace_tasks:{workspace_id}`
/// or `board_columns:all`. The first segment is the cache namespace and must
/// be literal; later segments may reference identifying columns of the
/// subscribed entity with `{column}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidationTarget {
    namespace: String,
    segments: Vec<TargetSegment>,
}

impl InvalidationTarget {
    /// Parses a target pattern against the schema of the subscribed entity.
    ///
    /// Placeholders naming columns the entity does not carry are rejected up
    /// front: they could never resolve, so the registration is a bug at the
    /// call site rather than something to discover in production.
    pub fn parse(
        entity: EntityKind,
        raw: &str,
    ) -> Result<Self> {
        let mut parts = raw.split(':');
        let namespace = parts.next().unwrap_or_default().trim();
        if namespace.is_empty() || namespace.contains(['{', '}']) {
            return Err(RouterError::InvalidTarget(raw.to_string()).into());
        }

        let mut segments = Vec::new();
        for part in parts {
            let part = part.trim();
            if let Some(column) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if column.is_empty() {
                    return Err(RouterError::InvalidTarget(raw.to_string()).into());
                }
                if !entity.has_column(column) {
                    return Err(RouterError::UnknownColumn {
                        entity: entity.as_str().to_string(),
                        column: column.to_string(),
                    }
                    .into());
                }
                segments.push(TargetSegment::Column(column.to_string()));
            } else if part.is_empty() || part.contains(['{', '}']) {
                return Err(RouterError::InvalidTarget(raw.to_string()).into());
            } else {
                segments.push(TargetSegment::Literal(part.to_string()));
            }
        }

        Ok(InvalidationTarget {
            namespace: namespace.to_string(),
            segments,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_fully_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, TargetSegment::Literal(_)))
    }

    /// Resolves the pattern against a changed row.
    ///
    /// Returns `None` when the row lacks any referenced column, in which case
    /// the caller falls back to [`sweep_action`](Self::sweep_action) rather
    /// than skipping the target and risking a stale entry.
    pub fn resolve(
        &self,
        row: &RowFields,
    ) -> Option<CacheKey> {
        let mut params = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                TargetSegment::Literal(text) => params.push(text.clone()),
                TargetSegment::Column(column) => params.push(row.get(column)?.canonical()),
            }
        }
        Some(CacheKey::new(&self.namespace, params))
    }

    /// The whole-target invalidation applied by catch-up sweeps, and as the
    /// fallback when a row cannot resolve the template.
    ///
    /// Fully literal targets name exactly one key. Templated targets widen to
    /// a prefix removal covering every key the template could have produced:
    /// the namespace plus any leading literal segments, terminated with `:`
    /// so that `tasks` never sweeps a sibling namespace like `tasks_archive`.
    pub fn sweep_action(&self) -> SweepAction {
        if self.is_fully_literal() {
            let params = self
                .segments
                .iter()
                .map(|segment| match segment {
                    TargetSegment::Literal(text) => text.clone(),
                    TargetSegment::Column(_) => unreachable!("checked literal"),
                })
                .collect();
            return SweepAction::Exact(CacheKey::new(&self.namespace, params));
        }

        let mut prefix = self.namespace.clone();
        for segment in &self.segments {
            match segment {
                TargetSegment::Literal(text) => {
                    prefix.push(':');
                    prefix.push_str(text);
                }
                TargetSegment::Column(_) => break,
            }
        }
        prefix.push(':');
        SweepAction::Prefix(prefix)
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.namespace)?;
        for segment in &self.segments {
            match segment {
                TargetSegment::Literal(text) => write!(f, ":{}", text)?,
                TargetSegment::Column(column) => write!(f, ":{{{}}}", column)?,
            }
        }
        Ok(())
    }
}

/// One sweeping invalidation, deduplicable across targets and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SweepAction {
    /// Remove exactly one key.
    Exact(CacheKey),
    /// Remove every key under a canonical prefix.
    Prefix(String),
}
