//! Build-plan resolution over the pipeline graph

use std::collections::HashSet;

use osforge_errors::{Error, ResolveError};
use osforge_types::{Manifest, ObjectId, ObjectLookup, Pipeline};

use crate::plan::BuildPlan;

/// Computes the minimal set of pipelines a build must run
#[derive(Clone, Copy, Debug, Default)]
pub struct Resolver;

impl Resolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Check that every export and checkpoint names a pipeline, without
    /// looking at the store.
    ///
    /// # Errors
    /// The same resolve errors as [`Resolver::depsolve`].
    pub fn validate<E, C>(&self, manifest: &Manifest, exports: E, checkpoints: C) -> Result<(), Error>
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        lookup_requests(manifest, exports, checkpoints).map(|_| ())
    }

    /// Resolve `exports` and `checkpoints` (pipeline names or id hex) into
    /// a build plan against the already `committed` objects.
    ///
    /// A requested pipeline runs unless it is committed. Walking down the
    /// build chain stops at the first committed ancestor: its tree can be
    /// reused as is.
    ///
    /// # Errors
    /// - `ResolveError::UnknownExports` if any export names no pipeline
    /// - `ResolveError::MissedCheckpoints` if any checkpoint names no
    ///   pipeline
    ///
    /// Both are reported before any work starts.
    pub fn depsolve<L, E, C>(
        &self,
        manifest: &Manifest,
        committed: &L,
        exports: E,
        checkpoints: C,
    ) -> Result<BuildPlan, Error>
    where
        L: ObjectLookup + ?Sized,
        E: IntoIterator,
        E::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let (exports, checkpoints) = lookup_requests(manifest, exports, checkpoints)?;

        let mut needed = HashSet::new();
        let mut skipped = Vec::new();
        for target in exports.iter().chain(&checkpoints) {
            if committed.is_committed(&target.id()) {
                if !skipped.contains(&target.id()) {
                    skipped.push(target.id());
                }
                continue;
            }
            mark_chain(manifest, committed, target, &mut needed);
        }

        let plan = BuildPlan::new(
            manifest,
            &needed,
            skipped,
            exports.iter().map(|p| p.id()).collect(),
            checkpoints.iter().map(|p| p.id()).collect(),
        );
        tracing::debug!(
            pipelines = plan.len(),
            skipped = plan.skipped().len(),
            "resolved build plan"
        );
        Ok(plan)
    }
}

/// Look up every requested export and checkpoint, failing on the first
/// group with names that match no pipeline
fn lookup_requests<'m, E, C>(
    manifest: &'m Manifest,
    exports: E,
    checkpoints: C,
) -> Result<(Vec<&'m Pipeline>, Vec<&'m Pipeline>), Error>
where
    E: IntoIterator,
    E::Item: AsRef<str>,
    C: IntoIterator,
    C::Item: AsRef<str>,
{
    let (exports, unknown) = lookup_all(manifest, exports);
    if !unknown.is_empty() {
        return Err(ResolveError::UnknownExports { names: unknown }.into());
    }

    let (checkpoints, missed) = lookup_all(manifest, checkpoints);
    if !missed.is_empty() {
        return Err(ResolveError::MissedCheckpoints { names: missed }.into());
    }
    Ok((exports, checkpoints))
}

/// Resolve every name, returning matches and the names that matched nothing
fn lookup_all<'m, I>(manifest: &'m Manifest, names: I) -> (Vec<&'m Pipeline>, Vec<String>)
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for name in names {
        let name = name.as_ref();
        match manifest.get(name) {
            Some(pipeline) => found.push(pipeline),
            None => missing.push(name.to_string()),
        }
    }
    (found, missing)
}

/// Mark `target` and its uncommitted build ancestors as needed
fn mark_chain<L>(manifest: &Manifest, committed: &L, target: &Pipeline, needed: &mut HashSet<ObjectId>)
where
    L: ObjectLookup + ?Sized,
{
    let mut current = Some(target);
    while let Some(pipeline) = current {
        let id = pipeline.id();
        if committed.is_committed(&id) || !needed.insert(id) {
            break;
        }
        current = pipeline.build().and_then(|build| manifest.get_by_id(&build));
    }
}
