use std::future::Future;
use std::sync::{Arc, RwLock};

use futures_util::future::BoxFuture;
use jobline_core::config::{DuplicateNamePolicy, RegistryConfig};
use tracing::{debug, warn};

use crate::args::{signature, ArgType, Args};
use crate::error::{RegistryError, ResolutionError};
use crate::target::is_identifier;

/// What a job method returns. Any error type converts through `?`.
pub type HandlerResult = anyhow::Result<()>;

pub(crate) enum Handler {
    Sync(Arc<dyn Fn(&Args) -> HandlerResult + Send + Sync>),
    Async(Arc<dyn Fn(Args) -> BoxFuture<'static, HandlerResult> + Send + Sync>),
}

/// One overload in a component's method table.
pub struct Method {
    name: String,
    params: Vec<ArgType>,
    pub(crate) handler: Handler,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ArgType] {
        &self.params
    }

    pub fn is_async(&self) -> bool {
        matches!(self.handler, Handler::Async(_))
    }

    pub fn signature(&self) -> String {
        signature(&self.params)
    }

    fn accepts(&self, arg_types: &[ArgType]) -> bool {
        self.params.len() == arg_types.len()
            && self
                .params
                .iter()
                .zip(arg_types)
                .all(|(param, arg)| param.accepts(*arg))
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("async", &self.is_async())
            .finish()
    }
}

/// A live instance plus the method table through which jobs may call it.
#[derive(Debug)]
pub struct Component {
    qualified_name: String,
    methods: Vec<Arc<Method>>,
}

impl Component {
    /// Start describing a component registered as `qualified_name`
    /// (`namespace.Short` or `Short`).
    pub fn builder<T>(qualified_name: impl Into<String>, instance: Arc<T>) -> ComponentBuilder<T>
    where
        T: Send + Sync + 'static,
    {
        ComponentBuilder {
            qualified_name: qualified_name.into(),
            instance,
            methods: Vec::new(),
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn short_name(&self) -> &str {
        self.qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.qualified_name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.qualified_name.rsplit_once('.').map(|(ns, _)| ns)
    }

    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }

    /// Pick the overload for `name` that can take `arg_types`.
    ///
    /// An exact positional type match wins; otherwise the first overload (in
    /// registration order) whose parameters accept the arguments by widening.
    pub fn find_method(&self, name: &str, arg_types: &[ArgType]) -> Option<Arc<Method>> {
        let named = || self.methods.iter().filter(move |m| m.name == name);
        named()
            .find(|m| m.params == arg_types)
            .or_else(|| named().find(|m| m.accepts(arg_types)))
            .cloned()
    }
}

/// Builder returned by [`Component::builder`].
pub struct ComponentBuilder<T> {
    qualified_name: String,
    instance: Arc<T>,
    methods: Vec<Method>,
}

impl<T: Send + Sync + 'static> ComponentBuilder<T> {
    /// Register a synchronous method.
    pub fn method<F>(mut self, name: &str, params: &[ArgType], f: F) -> Self
    where
        F: Fn(&T, &Args) -> HandlerResult + Send + Sync + 'static,
    {
        let instance = Arc::clone(&self.instance);
        let handler = move |args: &Args| f(&instance, args);
        self.methods.push(Method {
            name: name.to_string(),
            params: params.to_vec(),
            handler: Handler::Sync(Arc::new(handler)),
        });
        self
    }

    /// Register a method whose body is a future; the dispatcher awaits it.
    pub fn async_method<F, Fut>(mut self, name: &str, params: &[ArgType], f: F) -> Self
    where
        F: Fn(Arc<T>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let instance = Arc::clone(&self.instance);
        let handler = move |args: Args| -> BoxFuture<'static, HandlerResult> {
            Box::pin(f(Arc::clone(&instance), args))
        };
        self.methods.push(Method {
            name: name.to_string(),
            params: params.to_vec(),
            handler: Handler::Async(Arc::new(handler)),
        });
        self
    }

    pub fn build(self) -> Result<Component, RegistryError> {
        if !self.qualified_name.split('.').all(is_identifier) {
            return Err(RegistryError::InvalidComponentName {
                name: self.qualified_name,
            });
        }
        for (i, method) in self.methods.iter().enumerate() {
            if !is_identifier(&method.name) {
                return Err(RegistryError::InvalidMethodName {
                    component: self.qualified_name.clone(),
                    name: method.name.clone(),
                });
            }
            let duplicate = self.methods[..i]
                .iter()
                .any(|m| m.name == method.name && m.params == method.params);
            if duplicate {
                return Err(RegistryError::DuplicateMethod {
                    component: self.qualified_name.clone(),
                    method: method.name.clone(),
                    signature: method.signature(),
                });
            }
        }
        Ok(Component {
            qualified_name: self.qualified_name,
            methods: self.methods.into_iter().map(Arc::new).collect(),
        })
    }
}

/// Outcome of [`ComponentRegistry::resolve`].
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Qualified name of the chosen component.
    pub component: String,
    pub method: Arc<Method>,
    /// Set when several components matched and one was picked heuristically.
    pub ambiguity: Option<String>,
}

/// Process-wide table of components that invocation targets can name.
///
/// Filled at startup through [`ComponentRegistry::register`]; resolution is a
/// name lookup, no type scanning involved. Share it as `Arc<ComponentRegistry>`.
pub struct ComponentRegistry {
    /// Registration order is significant for tie-breaking.
    components: RwLock<Vec<Arc<Component>>>,
    policy: DuplicateNamePolicy,
    jobs_namespace: String,
}

impl ComponentRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            components: RwLock::new(Vec::new()),
            policy: config.duplicate_short_names,
            jobs_namespace: config.jobs_namespace.clone(),
        }
    }

    pub fn register(&self, component: Component) -> Result<(), RegistryError> {
        let mut components = self.components.write().expect("component registry poisoned");

        if components
            .iter()
            .any(|c| c.qualified_name == component.qualified_name)
        {
            return Err(RegistryError::DuplicateComponent {
                name: component.qualified_name,
            });
        }
        if self.policy == DuplicateNamePolicy::Reject {
            if let Some(existing) = components
                .iter()
                .find(|c| c.short_name() == component.short_name())
            {
                return Err(RegistryError::AmbiguousShortName {
                    short: component.short_name().to_string(),
                    name: component.qualified_name.clone(),
                    existing: existing.qualified_name.clone(),
                });
            }
        }

        debug!(
            component = %component.qualified_name,
            methods = component.methods.len(),
            "component registered"
        );
        components.push(Arc::new(component));
        Ok(())
    }

    /// Every component whose short or qualified name equals `name`, in
    /// registration order.
    pub fn lookup(&self, name: &str) -> Vec<Arc<Component>> {
        let components = self.components.read().expect("component registry poisoned");
        components
            .iter()
            .filter(|c| c.qualified_name == name || c.short_name() == name)
            .cloned()
            .collect()
    }

    /// Qualified names of all registered components.
    pub fn names(&self) -> Vec<String> {
        let components = self.components.read().expect("component registry poisoned");
        components.iter().map(|c| c.qualified_name.clone()).collect()
    }

    /// Find the component named `component` and its overload of `method`
    /// that accepts `arg_types`.
    pub fn resolve(
        &self,
        component: &str,
        method: &str,
        arg_types: &[ArgType],
    ) -> Result<Resolved, ResolutionError> {
        let candidates = self.lookup(component);
        let (chosen, ambiguity) = match candidates.as_slice() {
            [] => {
                return Err(ResolutionError::ComponentNotFound {
                    component: component.to_string(),
                })
            }
            [only] => (Arc::clone(only), None),
            [first, ..] => {
                let preferred: Vec<&Arc<Component>> = candidates
                    .iter()
                    .filter(|c| c.namespace().is_some_and(|ns| self.is_jobs_namespace(ns)))
                    .collect();
                let chosen = match preferred.as_slice() {
                    [only] => Arc::clone(only),
                    _ => Arc::clone(first),
                };
                let names: Vec<&str> = candidates.iter().map(|c| c.qualified_name()).collect();
                let note = format!(
                    "`{component}` matches {}; using {}",
                    names.join(", "),
                    chosen.qualified_name
                );
                warn!(component, chosen = %chosen.qualified_name, "ambiguous component name");
                (chosen, Some(note))
            }
        };

        let handle = chosen.find_method(method, arg_types).ok_or_else(|| {
            ResolutionError::MethodNotFound {
                component: chosen.qualified_name.clone(),
                method: method.to_string(),
                signature: signature(arg_types),
            }
        })?;

        Ok(Resolved {
            component: chosen.qualified_name.clone(),
            method: handle,
            ambiguity,
        })
    }

    /// Last namespace segment compared case-insensitively: `app.Jobs` counts.
    fn is_jobs_namespace(&self, namespace: &str) -> bool {
        namespace
            .rsplit('.')
            .next()
            .is_some_and(|last| last.eq_ignore_ascii_case(&self.jobs_namespace))
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Reports;

    fn reports(name: &str) -> Component {
        Component::builder(name, Arc::new(Reports))
            .method("Generate", &[], |_, _| Ok(()))
            .method("Generate", &[ArgType::String], |_, _| Ok(()))
            .method("Window", &[ArgType::Long], |_, _| Ok(()))
            .method("Window", &[ArgType::Integer], |_, _| Ok(()))
            .async_method("Ratio", &[ArgType::Double], |_, _| async { Ok::<(), anyhow::Error>(()) })
            .build()
            .unwrap()
    }

    fn prefer_namespace() -> RegistryConfig {
        RegistryConfig {
            duplicate_short_names: DuplicateNamePolicy::PreferNamespace,
            ..RegistryConfig::default()
        }
    }

    #[test]
    fn resolves_by_short_or_qualified_name() {
        let registry = ComponentRegistry::default();
        registry.register(reports("jobs.ReportJob")).unwrap();

        for name in ["ReportJob", "jobs.ReportJob"] {
            let resolved = registry.resolve(name, "Generate", &[]).unwrap();
            assert_eq!(resolved.component, "jobs.ReportJob");
            assert!(resolved.method.params().is_empty());
            assert!(resolved.ambiguity.is_none());
        }
    }

    #[test]
    fn overloads_prefer_exact_types_then_widening() {
        let registry = ComponentRegistry::default();
        registry.register(reports("ReportJob")).unwrap();

        let exact = registry
            .resolve("ReportJob", "Window", &[ArgType::Integer])
            .unwrap();
        assert_eq!(exact.method.params(), &[ArgType::Integer]);

        let widened = registry
            .resolve("ReportJob", "Ratio", &[ArgType::Integer])
            .unwrap();
        assert_eq!(widened.method.params(), &[ArgType::Double]);
        assert!(widened.method.is_async());
    }

    #[test]
    fn missing_component_and_method_are_distinct_errors() {
        let registry = ComponentRegistry::default();
        registry.register(reports("ReportJob")).unwrap();

        assert_eq!(
            registry.resolve("Nope", "Generate", &[]).unwrap_err(),
            ResolutionError::ComponentNotFound {
                component: "Nope".into()
            }
        );
        assert_eq!(
            registry
                .resolve("ReportJob", "Generate", &[ArgType::Bool])
                .unwrap_err(),
            ResolutionError::MethodNotFound {
                component: "ReportJob".into(),
                method: "Generate".into(),
                signature: "(bool)".into(),
            }
        );
        assert!(registry
            .resolve("ReportJob", "Window", &[ArgType::Double])
            .is_err());
    }

    #[test]
    fn duplicate_short_names_are_rejected_by_default() {
        let registry = ComponentRegistry::default();
        registry.register(reports("jobs.ReportJob")).unwrap();
        let err = registry.register(reports("legacy.ReportJob")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::AmbiguousShortName {
                short: "ReportJob".into(),
                name: "legacy.ReportJob".into(),
                existing: "jobs.ReportJob".into(),
            }
        );
        assert_eq!(registry.names(), vec!["jobs.ReportJob".to_string()]);
    }

    #[test]
    fn duplicate_qualified_names_are_always_rejected() {
        let registry = ComponentRegistry::new(&prefer_namespace());
        registry.register(reports("jobs.ReportJob")).unwrap();
        assert!(matches!(
            registry.register(reports("jobs.ReportJob")),
            Err(RegistryError::DuplicateComponent { .. })
        ));
    }

    #[test]
    fn ambiguous_names_prefer_the_jobs_namespace() {
        let registry = ComponentRegistry::new(&prefer_namespace());
        registry.register(reports("legacy.ReportJob")).unwrap();
        registry.register(reports("app.Jobs.ReportJob")).unwrap();

        assert_eq!(registry.lookup("ReportJob").len(), 2);
        let resolved = registry.resolve("ReportJob", "Generate", &[]).unwrap();
        assert_eq!(resolved.component, "app.Jobs.ReportJob");
        assert!(resolved.ambiguity.is_some());
    }

    #[test]
    fn ambiguous_names_without_preference_use_registration_order() {
        let registry = ComponentRegistry::new(&prefer_namespace());
        registry.register(reports("b.ReportJob")).unwrap();
        registry.register(reports("a.ReportJob")).unwrap();

        let resolved = registry.resolve("ReportJob", "Generate", &[]).unwrap();
        assert_eq!(resolved.component, "b.ReportJob");
        assert!(resolved.ambiguity.unwrap().contains("a.ReportJob"));
    }

    #[test]
    fn builder_validates_names_and_overloads() {
        assert!(matches!(
            Component::builder("bad name", Arc::new(Reports)).build(),
            Err(RegistryError::InvalidComponentName { .. })
        ));
        assert!(matches!(
            Component::builder("Ok", Arc::new(Reports))
                .method("not-valid", &[], |_, _| Ok(()))
                .build(),
            Err(RegistryError::InvalidMethodName { .. })
        ));
        assert!(matches!(
            Component::builder("Ok", Arc::new(Reports))
                .method("Run", &[ArgType::Long], |_, _| Ok(()))
                .method("Run", &[ArgType::Long], |_, _| Ok(()))
                .build(),
            Err(RegistryError::DuplicateMethod { .. })
        ));
    }
}
