//! Move and copy engine
//!
//! Relocates items between storing repositories. A call first validates
//! the repositories and top-level permissions; any failure there aborts
//! before anything is touched. Paths are then processed in canonical
//! order, files one at a time under the write locks of both source and
//! destination, with read locks on the folders above them (taken through
//! [`LockManager::write_many_with_ancestors`]). Per-path
//! failures go to the returned [`MultiStatus`] and the batch continues
//! unless `fail_fast` is set.
//!
//! [`LockManager::write_many_with_ancestors`]: crate::lock::LockManager::write_many_with_ancestors

mod aggregate;
mod recalc;

pub use aggregate::aggregate_by_parent;
pub use recalc::{
    MetadataCalculator, MetadataRecalculator, RECENT_RECALCULATIONS, VERSIONS_PROPERTY,
    VersionIndexCalculator,
};

use crate::cancel::StopSignal;
use crate::item::ItemInfo;
use crate::registry::RepoRegistry;
use crate::repo::{LocalRepo, Repo};
use crate::security::{Action, Authorizer};
use crate::status::MultiStatus;
use crate::{Error, Result};
use binrepo_fs::RepoPath;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Destination of a move or copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    /// An explicit destination path
    Path(RepoPath),
    /// The same relative path in another repository
    Repo(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOptions {
    /// Keep the source
    pub copy: bool,
    /// Validate and report only
    pub dry_run: bool,
    /// Mark artifact folders for metadata recalculation
    pub recalc_maven_metadata: bool,
    /// Remove source ancestors left empty by a move
    pub prune_empty_folders: bool,
    /// Stop at the first per-path failure
    pub fail_fast: bool,
}

impl MoveOptions {
    pub fn moving() -> Self {
        Self::default()
    }

    pub fn copying() -> Self {
        Self {
            copy: true,
            ..Self::default()
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn recalc_maven_metadata(mut self, recalc: bool) -> Self {
        self.recalc_maven_metadata = recalc;
        self
    }

    pub fn prune_empty_folders(mut self, prune: bool) -> Self {
        self.prune_empty_folders = prune;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn verb(&self) -> &'static str {
        if self.copy { "copy" } else { "move" }
    }
}

/// A single move or copy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoverConfig {
    pub from: RepoPath,
    pub to: MoveTarget,
    pub options: MoveOptions,
}

impl MoverConfig {
    pub fn new(from: RepoPath, to: MoveTarget, options: MoveOptions) -> Self {
        Self { from, to, options }
    }

    /// Move `from` to the same relative path in `target_repo`.
    pub fn to_repo(from: RepoPath, target_repo: &str, options: MoveOptions) -> Self {
        Self::new(from, MoveTarget::Repo(target_repo.to_string()), options)
    }

    pub fn target_path(&self) -> RepoPath {
        match &self.to {
            MoveTarget::Path(path) => path.clone(),
            MoveTarget::Repo(key) => self.from.with_repo(key.clone()),
        }
    }
}

/// The artifact-level folder whose metadata a change at `path` affects.
///
/// For a folder that is its parent; for a file, the folder above its
/// version folder, falling back to the parent and then the root.
pub fn metadata_folder(path: &RepoPath, is_folder: bool) -> RepoPath {
    let root = RepoPath::root(path.repo_key().to_string());
    let parent = path.parent().unwrap_or_else(|| root.clone());
    if is_folder {
        return parent;
    }
    parent.parent().unwrap_or(parent)
}

struct Plan {
    from: RepoPath,
    to: RepoPath,
    source: Arc<LocalRepo>,
    target: Arc<LocalRepo>,
}

/// Executes move/copy requests against a registry.
pub struct Mover<'a> {
    registry: &'a RepoRegistry,
    authorizer: &'a Authorizer,
    recalculator: Option<&'a MetadataRecalculator>,
}

impl<'a> Mover<'a> {
    pub fn new(registry: &'a RepoRegistry, authorizer: &'a Authorizer) -> Self {
        Self {
            registry,
            authorizer,
            recalculator: None,
        }
    }

    pub fn with_recalculator(mut self, recalculator: &'a MetadataRecalculator) -> Self {
        self.recalculator = Some(recalculator);
        self
    }

    /// Move or copy one path.
    pub fn move_or_copy(&self, config: &MoverConfig, stop: &StopSignal) -> MultiStatus {
        let pairs = vec![(config.from.clone(), config.target_path())];
        self.run(pairs, config.options, stop)
    }

    /// Move or copy many paths into `target_repo`, keeping relative paths.
    ///
    /// Paths that make up a whole folder are moved as that folder.
    pub fn move_or_copy_set(
        &self,
        paths: &[RepoPath],
        target_repo: &str,
        options: MoveOptions,
        stop: &StopSignal,
    ) -> MultiStatus {
        let mut by_repo: BTreeMap<&str, Vec<RepoPath>> = BTreeMap::new();
        for path in paths {
            by_repo.entry(path.repo_key()).or_default().push(path.clone());
        }

        let mut pairs = Vec::new();
        for (key, group) in by_repo {
            let source = self.registry.local_or_cached_repository_by_key(key);
            let aggregated = aggregate_by_parent(&group, |parent| match &source {
                Some(repo) => repo
                    .children(parent)
                    .iter()
                    .map(|c| c.repo_path.clone())
                    .collect(),
                None => Vec::new(),
            });
            for from in aggregated {
                let to = from.with_repo(target_repo.to_string());
                pairs.push((from, to));
            }
        }
        self.run(pairs, options, stop)
    }

    fn run(&self, pairs: Vec<(RepoPath, RepoPath)>, options: MoveOptions, stop: &StopSignal) -> MultiStatus {
        let mut status = MultiStatus::with_options(options.fail_fast, options.dry_run);

        let mut plans = match self.validate(pairs, options) {
            Ok(plans) => plans,
            Err(e) => {
                status.fatal(&e);
                return status;
            }
        };
        plans.sort_by_key(|plan| plan.from.id());

        let mut processed = Vec::new();
        for plan in &plans {
            if status.should_stop() {
                break;
            }
            if self.relocate(plan, options, stop, &mut status).is_err() {
                break;
            }
            processed.push(plan);
        }

        if !options.dry_run {
            if !options.copy && options.prune_empty_folders {
                for plan in &processed {
                    prune_empty_ancestors(&plan.source, &plan.from);
                }
            }
            if options.recalc_maven_metadata {
                if let Some(recalculator) = self.recalculator {
                    recalculator.schedule(status.marked_for_recalculation().clone());
                }
            }
        }

        if status.moved_count() == 0 && !status.is_error() {
            status.error(format!("No items were {}", past_tense(options)), 400);
        }
        tracing::info!(
            operation = options.verb(),
            dry_run = options.dry_run,
            moved = status.moved_count(),
            errors = status.errors().count(),
            "move/copy finished"
        );
        status
    }

    /// Repository and top-level permission checks.
    fn validate(&self, pairs: Vec<(RepoPath, RepoPath)>, options: MoveOptions) -> Result<Vec<Plan>> {
        let mut plans = Vec::with_capacity(pairs.len());
        for (from, to) in pairs {
            let source = self.storing_repo(from.repo_key(), "source")?;
            let target = self.storing_repo(to.repo_key(), "target")?;

            let permission = self
                .authorizer
                .require(Action::Read, &from)
                .and_then(|()| {
                    if options.copy {
                        Ok(())
                    } else {
                        self.authorizer.require(Action::Delete, &from)
                    }
                })
                .and_then(|()| self.authorizer.require(Action::Deploy, &to));
            if let Err(e) = permission {
                return Err(Error::StructuralMove {
                    message: e.to_string(),
                    status: 403,
                });
            }
            plans.push(Plan {
                from,
                to,
                source,
                target,
            });
        }
        Ok(plans)
    }

    fn storing_repo(&self, key: &str, role: &str) -> Result<Arc<LocalRepo>> {
        let structural = |message: String, status: u16| Error::StructuralMove { message, status };
        match self.registry.repository_by_key(key) {
            None => Err(structural(format!("{role} repository '{key}' does not exist"), 404)),
            Some(Repo::Remote(_)) | Some(Repo::Virtual(_)) => Err(structural(
                format!("{role} repository '{key}' is not a local or cache repository"),
                400,
            )),
            Some(Repo::Local(repo)) | Some(Repo::Cache(repo)) => {
                if repo.is_blacked_out() {
                    Err(structural(format!("{role} repository '{key}' is blacked out"), 503))
                } else {
                    Ok(repo)
                }
            }
        }
    }

    /// Relocate one planned path. `Err` only when the batch was stopped.
    fn relocate(&self, plan: &Plan, options: MoveOptions, stop: &StopSignal, status: &mut MultiStatus) -> Result<()> {
        if let Err(e) = stop.check() {
            status.fatal(&e);
            return Err(e);
        }
        let Plan {
            from,
            to,
            source,
            target,
        } = plan;

        if from.is_root() {
            status.error(format!("{from}: the repository root cannot be relocated"), 400);
            return Ok(());
        }
        let Some(info) = source.item_info(from) else {
            status.item_error(from, &Error::not_found(from));
            return Ok(());
        };
        if from.repo_key() == to.repo_key() && (from.path() == to.path() || to.is_descendant_of(from)) {
            status.error(format!("{from}: cannot {} an item onto itself or into its own subtree", options.verb()), 400);
            return Ok(());
        }
        if let Some(existing) = target.item_info(to) {
            if existing.is_folder() != info.is_folder() {
                status.error(format!("{from}: destination {to} exists with a different type"), 409);
                return Ok(());
            }
        }

        let moved_before = status.moved_count();
        let complete = if info.is_folder() {
            self.relocate_folder(plan, &info, options, stop, status)?
        } else {
            self.relocate_file(source, target, from, to, options, status)
        };

        if options.dry_run || status.moved_count() == moved_before {
            return Ok(());
        }
        if !options.copy && info.is_folder() && complete {
            self.remove_source_folder(source, from, status);
        }
        if options.recalc_maven_metadata {
            status.mark_for_recalculation(metadata_folder(to, info.is_folder()));
            if !options.copy {
                status.mark_for_recalculation(metadata_folder(from, info.is_folder()));
            }
        }
        Ok(())
    }

    /// Relocate a folder file by file. Returns whether every file made it.
    fn relocate_folder(
        &self,
        plan: &Plan,
        info: &ItemInfo,
        options: MoveOptions,
        stop: &StopSignal,
        status: &mut MultiStatus,
    ) -> Result<bool> {
        let Plan {
            from,
            to,
            source,
            target,
        } = plan;
        let user = self.authorizer.user();
        let moved_before = status.moved_count();
        let mut complete = true;

        if !options.dry_run {
            if let Err(e) = target.import_folder(info, to, &user) {
                status.item_error(to, &e);
                return Ok(false);
            }
        }

        for file in source.descendant_files(from) {
            if status.should_stop() {
                return Ok(false);
            }
            if let Err(e) = stop.check() {
                status.fatal(&e);
                return Err(e);
            }
            let Some(file_to) = file.repo_path.rebase(from, to) else {
                continue;
            };
            complete &= self.relocate_file(source, target, &file.repo_path, &file_to, options, status);
        }

        for folder in source.empty_descendant_folders(from) {
            let Some(folder_to) = folder.repo_path.rebase(from, to) else {
                continue;
            };
            if options.dry_run {
                status.record_moved(folder.repo_path.clone(), folder_to);
                continue;
            }
            match target.import_folder(&folder, &folder_to, &user) {
                Ok(()) => status.record_moved(folder.repo_path.clone(), folder_to),
                Err(e) => {
                    complete = false;
                    status.item_error(&folder_to, &e);
                }
            }
        }
        if complete && status.moved_count() == moved_before {
            status.record_moved(from.clone(), to.clone());
        }
        Ok(complete)
    }

    /// Relocate one file under both write locks. Returns whether it succeeded.
    fn relocate_file(
        &self,
        source: &LocalRepo,
        target: &LocalRepo,
        from: &RepoPath,
        to: &RepoPath,
        options: MoveOptions,
        status: &mut MultiStatus,
    ) -> bool {
        match self.try_relocate_file(source, target, from, to, options) {
            Ok(()) => {
                status.record_moved(from.clone(), to.clone());
                true
            }
            Err(e) => {
                status.item_error(from, &e);
                false
            }
        }
    }

    fn try_relocate_file(
        &self,
        source: &LocalRepo,
        target: &LocalRepo,
        from: &RepoPath,
        to: &RepoPath,
        options: MoveOptions,
    ) -> Result<()> {
        // Folder plans were only authorized at the folder level.
        self.authorizer.require(Action::Read, from)?;
        if !options.copy {
            self.authorizer.require(Action::Delete, from)?;
        }
        self.authorizer.require(Action::Deploy, to)?;

        if options.dry_run {
            if !source.item_exists(from) {
                return Err(Error::not_found(from));
            }
            return self.check_overwrite(target, to);
        }

        let _guards = self.registry.locks().write_many_with_ancestors([from, to])?;
        // The pre-lock snapshot may be stale.
        let info = source.item_info(from).ok_or_else(|| Error::not_found(from))?;
        self.check_overwrite(target, to)?;

        let mut content = source.read_content(from)?;
        target.import_locked(&info, &mut content, to, &self.authorizer.user())?;
        if !options.copy {
            source.delete_locked(from)?;
        }
        tracing::debug!(from = %from, to = %to, operation = options.verb(), "relocated");
        Ok(())
    }

    fn check_overwrite(&self, target: &LocalRepo, to: &RepoPath) -> Result<()> {
        match target.item_info(to) {
            Some(existing) if existing.is_folder() => {
                Err(Error::invalid_path(to, "a folder exists at the destination"))
            }
            Some(_) => self.authorizer.require(Action::Delete, to),
            None => Ok(()),
        }
    }

    fn remove_source_folder(&self, source: &LocalRepo, from: &RepoPath, status: &mut MultiStatus) {
        let result = source
            .locks()
            .write(from)
            .and_then(|_guard| match source.descendant_files(from).is_empty() {
                true => source.delete_locked(from).map(|_| ()),
                false => Ok(()),
            });
        if let Err(e) = result {
            status.warn(format!("{from}: source folder not removed: {e}"));
        }
    }
}

fn past_tense(options: MoveOptions) -> &'static str {
    if options.copy { "copied" } else { "moved" }
}

/// Delete empty folders above `path`, nearest first, stopping at the
/// first non-empty one. The root is never deleted.
fn prune_empty_ancestors(repo: &LocalRepo, path: &RepoPath) {
    for ancestor in path.ancestors().filter(|a| !a.is_root()) {
        let Ok(_guard) = repo.locks().write(&ancestor) else {
            return;
        };
        match repo.item_info(&ancestor) {
            Some(info) if info.is_folder() && repo.children(&ancestor).is_empty() => {
                if repo.delete_locked(&ancestor).is_err() {
                    return;
                }
                tracing::debug!(folder = %ancestor, "pruned empty folder");
            }
            Some(_) => return,
            None => continue,
        }
    }
}
