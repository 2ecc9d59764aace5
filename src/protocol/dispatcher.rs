use crate::core::serialization::SerializationFormat;
use crate::error::constants::{ERR_REGISTRY_READ_LOCK, ERR_REGISTRY_WRITE_LOCK};
use crate::error::{Result, RpcError};
use crate::protocol::message::ResponseMessage;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

type Invoker<H> = Box<dyn Fn(&H, &[u8], SerializationFormat) -> Result<Vec<u8>> + Send + Sync>;
type BoundInvoker = Box<dyn Fn(&[u8], SerializationFormat) -> Result<Vec<u8>> + Send + Sync>;

/// A handler object whose methods can be called by name.
///
/// Implementors list their callable methods in [`RpcService::methods`]; the
/// service is registered under [`RpcService::service_name`], which defaults
/// to the handler's type name.
///
/// ```
/// use network_rpc::protocol::dispatcher::{MethodSet, RpcService};
/// use network_rpc::error::Result;
///
/// struct Greeter;
///
/// impl Greeter {
///     fn hello(&self, name: String, reply: &mut String) -> Result<()> {
///         *reply = format!("hello {name}");
///         Ok(())
///     }
/// }
///
/// impl RpcService for Greeter {
///     fn methods(set: &mut MethodSet<Self>) {
///         set.method("Hello", Self::hello);
///     }
/// }
///
/// assert_eq!(Greeter.service_name(), "Greeter");
/// ```
pub trait RpcService: Send + Sync + Sized + 'static {
    /// Name the service is registered under
    fn service_name(&self) -> String {
        short_type_name::<Self>().to_string()
    }

    /// Declare the callable methods
    fn methods(set: &mut MethodSet<Self>);
}

/// Declared shape of a registered method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    pub name: String,
    pub argument_shape: &'static str,
    pub reply_shape: &'static str,
}

/// Method table under construction for handler type `H`
pub struct MethodSet<H> {
    methods: Vec<(MethodEntry, Invoker<H>)>,
}

impl<H: 'static> MethodSet<H> {
    fn new() -> Self {
        Self {
            methods: Vec::new(),
        }
    }

    /// Add a method taking an argument value and writing into a reply.
    ///
    /// Every call decodes a fresh `A` from the payload and starts from
    /// `R::default()`. An error returned by `f` becomes the call's failure.
    pub fn method<A, R, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + Default + 'static,
        F: Fn(&H, A, &mut R) -> Result<()> + Send + Sync + 'static,
    {
        let invoke: Invoker<H> = Box::new(
            move |handler: &H, payload: &[u8], format: SerializationFormat| {
                let args: A = format.decode(payload).map_err(|e| match e {
                    RpcError::Decode(msg) => RpcError::ArgDecode(msg),
                    other => other,
                })?;

                let mut reply = R::default();
                f(handler, args, &mut reply)?;

                format.encode(&ResponseMessage::success(&reply))
            },
        );

        let entry = MethodEntry {
            name: name.to_string(),
            argument_shape: std::any::type_name::<A>(),
            reply_shape: std::any::type_name::<R>(),
        };

        if let Some(slot) = self.methods.iter_mut().find(|(e, _)| e.name == name) {
            warn!(method = name, "Method declared twice, keeping the last definition");
            *slot = (entry, invoke);
        } else {
            self.methods.push((entry, invoke));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

struct RegisteredMethod {
    entry: MethodEntry,
    invoke: BoundInvoker,
}

struct ServiceEntry {
    name: String,
    methods: HashMap<String, RegisteredMethod>,
}

/// Registry of services, shared by every connection a server handles.
///
/// Registration takes the write lock; dispatch takes the read lock only for
/// the lookup and runs the method after releasing it.
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler under its service name
    pub fn register<S: RpcService>(&self, handler: S) -> Result<()> {
        let name = handler.service_name();

        let mut set = MethodSet::<S>::new();
        S::methods(&mut set);
        if set.is_empty() {
            return Err(RpcError::NoQualifyingMethods(name));
        }

        let handler = Arc::new(handler);
        let methods = set
            .methods
            .into_iter()
            .map(|(entry, invoke)| {
                let handler = Arc::clone(&handler);
                let bound: BoundInvoker =
                    Box::new(move |payload: &[u8], format: SerializationFormat| {
                        invoke(&handler, payload, format)
                    });
                (
                    entry.name.clone(),
                    RegisteredMethod {
                        entry,
                        invoke: bound,
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        let mut services = self
            .services
            .write()
            .map_err(|_| RpcError::Lock(ERR_REGISTRY_WRITE_LOCK))?;

        if services.contains_key(&name) {
            return Err(RpcError::DuplicateService(name));
        }

        debug!(service = %name, methods = methods.len(), "Registered service");
        services.insert(name.clone(), Arc::new(ServiceEntry { name, methods }));
        Ok(())
    }

    /// Invoke `service.method` with an encoded argument.
    ///
    /// Returns the encoded success `ResponseMessage`. Any failure, including
    /// the handler's own error, is returned as `Err` for the caller to wrap.
    pub fn dispatch(
        &self,
        service: &str,
        method: &str,
        payload: &[u8],
        format: SerializationFormat,
    ) -> Result<Vec<u8>> {
        let entry = {
            let services = self
                .services
                .read()
                .map_err(|_| RpcError::Lock(ERR_REGISTRY_READ_LOCK))?;
            services
                .get(service)
                .cloned()
                .ok_or_else(|| RpcError::ServiceNotFound(service.to_string()))?
        };

        let registered = entry
            .methods
            .get(method)
            .ok_or_else(|| RpcError::MethodNotFound(method.to_string()))?;

        debug!(service = %entry.name, method, bytes = payload.len(), "Dispatching call");
        (registered.invoke)(payload, format)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.services
            .read()
            .map(|s| s.contains_key(service))
            .unwrap_or(false)
    }

    /// Registered service names, sorted
    pub fn service_names(&self) -> Vec<String> {
        let mut names = self
            .services
            .read()
            .map(|s| s.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Method shapes of one service, sorted by name
    pub fn methods_of(&self, service: &str) -> Option<Vec<MethodEntry>> {
        let services = self.services.read().ok()?;
        let entry = services.get(service)?;
        let mut methods = entry
            .methods
            .values()
            .map(|m| m.entry.clone())
            .collect::<Vec<_>>();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Some(methods)
    }

    pub fn len(&self) -> usize {
        self.services.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last path segment of a type name, without generic arguments
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
