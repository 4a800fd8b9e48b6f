//! Module resolution: raw import specifier plus containing file in,
//! absolute file identity (or external) out.
//!
//! Strategies are layered and tried in order: host-supplied hooks, a
//! filesystem-free external short circuit, alias/path mappings,
//! stylesheet probing, then general standards-based resolution. Every
//! answer, including "external", is memoized in the session cache.

mod alias;
mod general;

use std::path::{Path, PathBuf};

use crate::cache::GraphCache;
use crate::paths::normalize_identity;
use crate::types::{AliasConfig, FileId};

use alias::AliasResolver;
pub(crate) use general::probe_candidate;

/// Runtime built-ins that can never resolve to a project file. Specifiers
/// carrying the `node:` scheme are handled separately.
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "dns",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "worker_threads",
    "zlib",
];

/// A host-supplied resolution strategy. First non-null answer wins, in
/// registration order, before any built-in layer runs.
pub struct ResolverHook {
    name: String,
    fun: Box<dyn Fn(&str, &str) -> Option<String> + Send + Sync>,
}

impl ResolverHook {
    pub fn new(
        name: impl Into<String>,
        fun: impl Fn(&str, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fun: Box::new(fun),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ResolverHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverHook")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Which layers run and which extensions they probe.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub code_extensions: Vec<String>,
    pub stylesheet_extensions: Vec<String>,
    pub resolve_aliases: bool,
    pub resolve_stylesheets: bool,
    pub general_fallback: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            code_extensions: ["ts", "tsx", "js", "jsx", "mjs", "cjs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stylesheet_extensions: ["css", "scss", "sass", "less"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            resolve_aliases: true,
            resolve_stylesheets: true,
            general_fallback: true,
        }
    }
}

/// The layered resolver for one project root. Immutable after
/// construction; all mutable state lives in the injected `GraphCache`.
#[derive(Debug)]
pub struct Resolver {
    root: PathBuf,
    options: ResolverOptions,
    hooks: Vec<ResolverHook>,
    alias: Option<AliasResolver>,
}

impl Resolver {
    /// Resolver for a project root, discovering tsconfig-style alias
    /// configuration by walking upward from the root.
    pub fn new(root: &Path) -> Self {
        Self::with_options(root, ResolverOptions::default())
    }

    pub fn with_options(root: &Path, options: ResolverOptions) -> Self {
        let alias = if options.resolve_aliases {
            AliasResolver::from_tsconfig(root)
        } else {
            None
        };
        Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            options,
            hooks: Vec::new(),
            alias,
        }
    }

    /// Resolver with a host-supplied alias map instead of on-disk
    /// configuration discovery.
    pub fn with_alias_config(root: &Path, config: &AliasConfig) -> Self {
        let mut resolver = Self::with_options(root, ResolverOptions::default());
        resolver.alias = Some(AliasResolver::from_config(&resolver.root, config));
        resolver
    }

    /// Register a hook. Hooks run before every built-in layer, in the
    /// order they were added.
    pub fn add_hook(&mut self, hook: ResolverHook) {
        self.hooks.push(hook);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve a specifier as written in `from_file`. `None` means the
    /// import is external or unresolvable and contributes no graph edge.
    pub fn resolve(
        &self,
        specifier: &str,
        from_file: &str,
        cache: &mut GraphCache,
    ) -> Option<FileId> {
        if let Some(memoized) = cache.cached_resolution(from_file, specifier) {
            return memoized;
        }
        let result = self.resolve_uncached(specifier, from_file, cache);
        cache.store_resolution(from_file.to_string(), specifier.to_string(), result.clone());
        result
    }

    fn resolve_uncached(
        &self,
        specifier: &str,
        from_file: &str,
        cache: &mut GraphCache,
    ) -> Option<FileId> {
        for hook in &self.hooks {
            cache.resolver_stats.hook_attempts += 1;
            if let Some(found) = (hook.fun)(specifier, from_file) {
                cache.resolver_stats.hook_hits += 1;
                tracing::trace!(hook = %hook.name, specifier, "resolved by hook");
                return Some(normalize_identity(Path::new(&found)));
            }
        }

        if self.is_certainly_external(specifier) {
            cache.resolver_stats.external_short_circuits += 1;
            return None;
        }

        if self.options.resolve_aliases
            && let Some(alias) = &self.alias
        {
            cache.resolver_stats.alias_attempts += 1;
            if let Some(id) = alias.resolve(specifier, &self.options.code_extensions, cache) {
                cache.resolver_stats.alias_hits += 1;
                return Some(id);
            }
        }

        if self.options.resolve_stylesheets && self.looks_like_stylesheet(specifier) {
            cache.resolver_stats.stylesheet_attempts += 1;
            if let Some(id) = self.resolve_relative(
                specifier,
                from_file,
                &self.options.stylesheet_extensions,
                cache,
            ) {
                cache.resolver_stats.stylesheet_hits += 1;
                return Some(id);
            }
        }

        if self.options.general_fallback {
            cache.resolver_stats.general_attempts += 1;
            if let Some(id) = self.resolve_general(specifier, from_file, cache) {
                cache.resolver_stats.general_hits += 1;
                return Some(id);
            }
        }

        None
    }

    /// Syntactic external check; never touches the filesystem. Specifiers
    /// covered by an alias pattern are exempt so aliases that look like
    /// package names are not masked.
    fn is_certainly_external(&self, specifier: &str) -> bool {
        if specifier.starts_with('.') || Path::new(specifier).is_absolute() {
            return false;
        }
        if let Some(alias) = &self.alias
            && alias.has_candidate(specifier)
        {
            return false;
        }
        if specifier.starts_with("node:") || specifier.contains("node_modules/") {
            return true;
        }
        let head = specifier.split('/').next().unwrap_or(specifier);
        if NODE_BUILTINS.contains(&head) {
            return true;
        }
        // Path-shaped bare specifiers remain resolvable relative to an
        // explicit baseUrl. Scoped packages always look external.
        if let Some(alias) = &self.alias
            && alias.has_explicit_base_url()
            && specifier.contains('/')
            && !specifier.starts_with('@')
        {
            return false;
        }
        true
    }

    /// Relative asset references without a recognized code extension go
    /// through the stylesheet layer.
    fn looks_like_stylesheet(&self, specifier: &str) -> bool {
        if !specifier.starts_with('.') {
            return false;
        }
        match Path::new(specifier).extension().and_then(|e| e.to_str()) {
            Some(ext) => !self.options.code_extensions.iter().any(|c| c == ext),
            None => true,
        }
    }

    fn resolve_relative(
        &self,
        specifier: &str,
        from_file: &str,
        exts: &[String],
        cache: &mut GraphCache,
    ) -> Option<FileId> {
        let base = Path::new(from_file).parent()?;
        probe_candidate(&base.join(specifier), exts, cache)
    }

    fn resolve_general(
        &self,
        specifier: &str,
        from_file: &str,
        cache: &mut GraphCache,
    ) -> Option<FileId> {
        let candidate = if specifier.starts_with('.') {
            Path::new(from_file).parent()?.join(specifier)
        } else if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else {
            // Path-shaped specifiers that survived the external check are
            // resolved package-relative.
            self.root.join(specifier)
        };
        probe_candidate(&candidate, &self.options.code_extensions, cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn id_of(dir: &TempDir, rel: &str) -> String {
        normalize_identity(&dir.path().join(rel))
    }

    #[test]
    fn resolves_relative_with_extension_probing() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "import {} from './user.service'");
        write(&dir, "src/user.service.ts", "export {}");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        // Dotted filenames still probe by appending each extension.
        assert_eq!(
            resolver.resolve("./user.service", &from, &mut cache),
            Some(id_of(&dir, "src/user.service.ts"))
        );
    }

    #[test]
    fn resolves_directory_index() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");
        write(&dir, "src/utils/index.ts", "export {}");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        assert_eq!(
            resolver.resolve("./utils", &from, &mut cache),
            Some(id_of(&dir, "src/utils/index.ts"))
        );
    }

    #[test]
    fn bare_packages_short_circuit_to_external() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");
        let checks_before = cache.stats().existence_checks;

        assert_eq!(resolver.resolve("react", &from, &mut cache), None);
        assert_eq!(resolver.resolve("node:fs", &from, &mut cache), None);
        assert_eq!(resolver.resolve("path", &from, &mut cache), None);
        assert_eq!(resolver.resolve("@scope/pkg", &from, &mut cache), None);

        let stats = cache.resolver_stats();
        assert_eq!(stats.external_short_circuits, 4);
        // The fast path never touches the filesystem.
        assert_eq!(cache.stats().existence_checks, checks_before);
    }

    #[test]
    fn alias_wins_over_general_resolution() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");
        write(&dir, "src/shared/thing.ts", "export {}");
        write(&dir, "shared/thing.ts", "export {}");

        let mut paths = HashMap::new();
        paths.insert("shared/*".to_string(), vec!["src/shared/*".to_string()]);
        let config = AliasConfig {
            base_url: Some(".".to_string()),
            paths,
        };
        let resolver = Resolver::with_alias_config(dir.path(), &config);
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        // Both the alias mapping and root-relative resolution match;
        // the alias layer runs first and wins.
        assert_eq!(
            resolver.resolve("shared/thing", &from, &mut cache),
            Some(id_of(&dir, "src/shared/thing.ts"))
        );
    }

    #[test]
    fn hooks_run_before_every_builtin_layer() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");
        write(&dir, "src/b.ts", "");
        let target = id_of(&dir, "src/b.ts");

        let mut resolver = Resolver::new(dir.path());
        let hooked = target.clone();
        resolver.add_hook(ResolverHook::new("virtual", move |spec, _from| {
            (spec == "virtual:b").then(|| hooked.clone())
        }));

        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        assert_eq!(resolver.resolve("virtual:b", &from, &mut cache), Some(target));
        // Non-matching specifiers fall through to the normal layers.
        assert_eq!(resolver.resolve("react", &from, &mut cache), None);
        let stats = cache.resolver_stats();
        assert_eq!(stats.hook_attempts, 2);
        assert_eq!(stats.hook_hits, 1);
    }

    #[test]
    fn resolutions_are_memoized_per_from_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");
        write(&dir, "src/b.ts", "");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        let first = resolver.resolve("./b", &from, &mut cache);
        let second = resolver.resolve("./b", &from, &mut cache);
        assert_eq!(first, second);
        assert_eq!(cache.stats().resolution_hits, 1);
        assert_eq!(cache.stats().resolution_misses, 1);
    }

    #[test]
    fn stylesheet_specifiers_resolve_when_enabled() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");
        write(&dir, "src/theme.scss", "");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        assert_eq!(
            resolver.resolve("./theme.scss", &from, &mut cache),
            Some(id_of(&dir, "src/theme.scss"))
        );
        assert_eq!(cache.resolver_stats().stylesheet_hits, 1);
    }

    #[test]
    fn stylesheet_layer_respects_its_toggle() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");
        write(&dir, "src/theme.css", "");

        let options = ResolverOptions {
            resolve_stylesheets: false,
            general_fallback: false,
            ..Default::default()
        };
        let resolver = Resolver::with_options(dir.path(), options);
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        assert_eq!(resolver.resolve("./theme.css", &from, &mut cache), None);
        assert_eq!(cache.resolver_stats().stylesheet_attempts, 0);
    }

    #[test]
    fn package_entry_points_resolve_through_exports() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");
        write(
            &dir,
            "src/pkg/package.json",
            r#"{"exports": {".": {"import": "./lib/entry.js"}}}"#,
        );
        write(&dir, "src/pkg/lib/entry.js", "module.exports = {}");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        assert_eq!(
            resolver.resolve("./pkg", &from, &mut cache),
            Some(id_of(&dir, "src/pkg/lib/entry.js"))
        );
    }

    #[test]
    fn unresolvable_relative_specifier_is_negative_cached() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/a.ts", "");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let from = id_of(&dir, "src/a.ts");

        assert_eq!(resolver.resolve("./missing", &from, &mut cache), None);
        assert_eq!(resolver.resolve("./missing", &from, &mut cache), None);
        assert_eq!(cache.stats().resolution_hits, 1);
    }
}
