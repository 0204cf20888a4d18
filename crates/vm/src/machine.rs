//! Machine state: frames, scopes, the dispatch cache and the output sink.

use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;

use quill_common::{
    Argument, ClosureRecord, Code, FunctionValue, Interface, NativeError, Object, Registry, Value,
};
use quill_compiler::Script;
use rustc_hash::FxHashMap;
use tracing::{debug, error, trace, warn};

use crate::control::ControlState;
use crate::error::RuntimeError;
use crate::scope::Scopes;

/// Default maximum number of live frames.
pub const MAX_FRAMES: usize = 4096;

/// Default maximum number of live scopes across all frames.
pub const MAX_SCOPES: usize = 65536;

/// Name of the read-only global holding the entry module's name.
pub const MODULE_NAME: &str = "__name__";

/// Resource limits for one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub max_frames: usize,
    pub max_scopes: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_frames: MAX_FRAMES,
            max_scopes: MAX_SCOPES,
        }
    }
}

/// Execution state of one body: the script's main code or one call.
#[derive(Debug)]
pub struct Frame {
    pub code: Arc<Code>,
    /// Index of the running statement.
    pub statement: usize,
    /// Index of the next instruction within the running statement.
    pub instruction: usize,
    /// Set once the running statement has passed its control check.
    pub(crate) entered: bool,
    pub control: ControlState,
    /// Results produced by the running statement, consumed LIFO.
    pub results: Vec<Object>,
    /// Result of the last expression statement, the implicit return value.
    pub last_value: Option<Object>,
    /// First scope owned by this frame.
    pub scope_base: usize,
    /// The function being run. `None` for the script itself.
    pub function: Option<Arc<Interface>>,
    pub closure: Option<Rc<ClosureRecord>>,
}

impl Frame {
    pub fn new(
        code: Arc<Code>,
        scope_base: usize,
        function: Option<Arc<Interface>>,
        closure: Option<Rc<ClosureRecord>>,
    ) -> Self {
        Self {
            code,
            statement: 0,
            instruction: 0,
            entered: false,
            control: ControlState::new(),
            results: Vec::new(),
            last_value: None,
            scope_base,
            function,
            closure,
        }
    }

    /// Continue at the start of statement `statement`.
    pub(crate) fn goto(&mut self, statement: usize) {
        self.statement = statement;
        self.instruction = 0;
        self.entered = false;
    }

    /// Start the body over, as for a tail call.
    pub(crate) fn restart(&mut self) {
        self.goto(0);
        self.control = ControlState::new();
        self.results.clear();
        self.last_value = None;
    }

    /// Source line of the running statement.
    pub fn line(&self) -> usize {
        self.code
            .get(self.statement)
            .or_else(|| self.code.last())
            .map_or(0, |s| s.line)
    }
}

type DispatchKey = (String, &'static str, usize);

/// The Quill machine.
pub struct Machine {
    pub(crate) registry: Arc<Registry>,
    pub(crate) config: MachineConfig,
    /// The running frame.
    pub(crate) frame: Frame,
    /// Suspended callers, outermost first.
    pub(crate) callers: Vec<Frame>,
    pub(crate) scopes: Scopes,
    /// Method lookups already resolved, by name, receiver type and arity.
    pub(crate) dispatch: FxHashMap<DispatchKey, Arc<Interface>>,
    pub(crate) out: Box<dyn Write>,
    main: Arc<Code>,
}

impl Machine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, MachineConfig::default())
    }

    pub fn with_config(registry: Arc<Registry>, config: MachineConfig) -> Self {
        let mut scopes = Scopes::new();
        let module = Object::new(Value::from("__main__"));
        module.set_read_only(true);
        scopes.declare(MODULE_NAME, module);

        let main: Arc<Code> = Arc::default();
        Self {
            registry,
            config,
            frame: Frame::new(Arc::clone(&main), 0, None, None),
            callers: Vec::new(),
            scopes,
            dispatch: FxHashMap::default(),
            out: Box::new(io::stdout()),
            main,
        }
    }

    /// Send `print` output to `out` instead of stdout.
    pub fn with_output(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> MachineConfig {
        self.config
    }

    /// Bind the script's functions as globals and make its main code the
    /// next thing [`run`](Self::run) executes.
    pub fn load(&mut self, script: &Script) {
        for def in &script.functions {
            let interface = Arc::new(Interface::user(&def.signature, Arc::clone(&def.body)));
            let value = Value::Function(FunctionValue::new(interface));
            self.scopes.declare(def.signature.name.clone(), Object::new(value));
            debug!(name = %def.signature.name, line = def.line, "function bound");
        }
        self.main = Arc::clone(&script.main);
    }

    /// Run the loaded script and return its result: the value of a
    /// top-level `return`, or else of the last expression statement.
    ///
    /// # Errors
    ///
    /// The first [`RuntimeError`] aborts the run. Every frame and every
    /// non-global scope is discarded; global bindings made before the
    /// error remain.
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        self.frame = Frame::new(Arc::clone(&self.main), 0, None, None);
        self.callers.clear();

        let result = self.execute();

        self.callers.clear();
        self.scopes.truncate(1);
        if let Err(e) = self.out.flush() {
            warn!(error = %e, "flushing output failed");
        }

        match result {
            Ok(object) => Ok(object.value()),
            Err(e) => {
                error!(line = e.line(), "{e}");
                Err(e)
            }
        }
    }

    /// Number of live frames, the running one included.
    pub fn depth(&self) -> usize {
        self.callers.len() + 1
    }

    /// Look `name` up: the running frame's own scopes, then its closure
    /// record, then every enclosing scope down to the globals.
    ///
    /// A binding found in the closure record comes back as a copy; the
    /// record itself never changes.
    pub fn lookup(&self, name: &str) -> Option<Object> {
        let base = self.frame.scope_base;
        if let Some(object) = self.scopes.find_from(base, name) {
            return Some(object.clone());
        }
        if let Some(captured) = self.frame.closure.as_ref().and_then(|c| c.get(name)) {
            return Some(captured.deep_copy());
        }
        self.scopes.find_below(base, name).cloned()
    }

    /// Like [`lookup`](Self::lookup), but a binding that only the closure
    /// record holds is first copied into the frame's parameter scope, so
    /// reads and writes for the rest of the call share one frame-local
    /// object.
    pub(crate) fn lookup_local(&mut self, name: &str) -> Option<Object> {
        let base = self.frame.scope_base;
        if let Some(object) = self.scopes.find_from(base, name) {
            return Some(object.clone());
        }
        if let Some(captured) = self.frame.closure.as_ref().and_then(|c| c.get(name)) {
            let local = captured.deep_copy();
            trace!(name, "captured binding copied into frame");
            self.scopes.declare_at(base, name, local.clone());
            return Some(local);
        }
        self.scopes.find_below(base, name).cloned()
    }

    /// Like [`lookup_local`](Self::lookup_local), falling back to a free
    /// native of that name wrapped as a function value.
    pub(crate) fn resolve_name(&mut self, name: &str, line: usize) -> Result<Object, RuntimeError> {
        if let Some(object) = self.lookup_local(name) {
            return Ok(object);
        }
        match self.registry.candidates(name, None).first() {
            Some(interface) => Ok(Object::new(Value::Function(FunctionValue::new(Arc::clone(
                interface,
            ))))),
            None => Err(RuntimeError::UnknownName {
                line,
                name: name.to_string(),
            }),
        }
    }

    /// Materialize one argument. Named objects are passed by reference.
    pub(crate) fn fetch(&mut self, arg: &Argument, line: usize) -> Result<Object, RuntimeError> {
        match arg {
            Argument::StackTop => self
                .frame
                .results
                .pop()
                .ok_or(RuntimeError::MissingOperand { line }),
            Argument::ObjectRef(name) => self
                .resolve_name(name, line)
                .map(|object| Object::alias_of(&object)),
            Argument::Literal { text, kind } => Value::from_literal(text, *kind)
                .map(Object::new)
                .ok_or_else(|| RuntimeError::BadLiteral {
                    line,
                    text: text.clone(),
                }),
        }
    }

    /// Materialize an argument list. Stack results are taken last to
    /// first, so the list is fetched in reverse.
    pub(crate) fn fetch_args(
        &mut self,
        args: &[Argument],
        line: usize,
    ) -> Result<Vec<Object>, RuntimeError> {
        let mut objects = Vec::with_capacity(args.len());
        for arg in args.iter().rev() {
            objects.push(self.fetch(arg, line)?);
        }
        objects.reverse();
        Ok(objects)
    }

    pub(crate) fn push_scope(&mut self, line: usize) -> Result<(), RuntimeError> {
        if self.scopes.len() >= self.config.max_scopes {
            return Err(RuntimeError::RecursionLimit {
                line,
                limit: self.config.max_scopes,
            });
        }
        self.scopes.push();
        Ok(())
    }

    pub(crate) fn native_error(name: &str, line: usize) -> impl FnOnce(NativeError) -> RuntimeError + '_ {
        move |source| RuntimeError::Native {
            line,
            name: name.to_string(),
            source,
        }
    }
}
