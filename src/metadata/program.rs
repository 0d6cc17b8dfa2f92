//! The program model: classes, fields and methods plus symbol resolution.
//!
//! A [`Program`] is the closed world the optimizer reasons about. It is built
//! incrementally through [`Program::add_class`], [`Program::add_field`],
//! [`Program::add_method`] and [`Program::set_body`], and then shared
//! read-only (behind an `Arc`) by every compilation worker.
//!
//! # Resolution
//!
//! - [`Program::resolve_virtual`] finds the implementation an exact receiver
//!   class dispatches to, matching by name and arity up the superclass chain.
//! - [`Program::resolve_single_target`] answers the harder question for calls
//!   whose receiver class is not known exactly: it only succeeds when no
//!   subtype anywhere overrides the named method.
//! - Access checks treat private members as accessible from their own class
//!   only; everything else is public.
//!
//! # Examples
//!
//! ```rust
//! use dotinline::analysis::ssa::ValueType;
//! use dotinline::metadata::program::{ClassFlags, FieldFlags, Program};
//!
//! let mut program = Program::new();
//! let point = program.add_class("Point", ClassFlags::FINAL, None);
//! let x = program.add_field(point, "x", FieldFlags::empty(), ValueType::Int)?;
//!
//! assert!(program.is_subtype(point, program.object_class()));
//! assert_eq!(program.instance_fields(point), vec![x]);
//! # Ok::<(), dotinline::Error>(())
//! ```

use std::collections::HashSet;

use bitflags::bitflags;

use crate::{
    analysis::ssa::{CallKind, SsaFunction, SsaFunctionBuilder, ValueType},
    metadata::token::{Token, TABLE_FIELD, TABLE_METHOD, TABLE_TYPE},
    Error, Result,
};

/// Name of the runtime root class every class ultimately extends.
pub const OBJECT_CLASS_NAME: &str = "Object";

/// Name shared by all instance constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of class initializers.
pub const CLASS_INITIALIZER_NAME: &str = "<clinit>";

/// Name of the finalizer method.
pub const FINALIZER_NAME: &str = "finalize";

bitflags! {
    /// Class attributes relevant to optimization.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClassFlags: u32 {
        /// Cannot be instantiated
        const ABSTRACT = 0x0001;
        /// Interface type
        const INTERFACE = 0x0002;
        /// Defined outside the program being compiled
        const LIBRARY = 0x0004;
        /// Cannot be subclassed
        const FINAL = 0x0008;
        /// Instances must never be scalarized
        const NO_CLASS_INLINING = 0x0010;
        /// Scalarize regardless of the inlining budget
        const ALWAYS_INLINE = 0x0020;
    }
}

bitflags! {
    /// Field attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u32 {
        /// Static field
        const STATIC = 0x0001;
        /// Assigned once, during initialization
        const FINAL = 0x0002;
        /// Accessible only by the declaring class
        const PRIVATE = 0x0004;
        /// Observed by code outside the program; must keep its storage
        const PINNED = 0x0008;
    }
}

bitflags! {
    /// Method attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        /// No receiver
        const STATIC = 0x0001;
        /// Dispatched on the receiver's runtime class
        const VIRTUAL = 0x0002;
        /// No implementation
        const ABSTRACT = 0x0004;
        /// Implemented outside the IR
        const NATIVE = 0x0008;
        /// Instance constructor
        const CONSTRUCTOR = 0x0010;
        /// Static class initializer
        const CLASS_INITIALIZER = 0x0020;
        /// Accessible only by the declaring class
        const PRIVATE = 0x0040;
        /// Must never be inlined
        const NEVER_INLINE = 0x0080;
    }
}

/// A class definition.
#[derive(Debug, Clone)]
pub struct ClassDef {
    /// Token of this class
    pub token: Token,
    /// Simple name
    pub name: String,
    /// Attributes
    pub flags: ClassFlags,
    /// Direct superclass; `None` only for the root class and interfaces
    pub super_class: Option<Token>,
    /// Directly implemented (or, for interfaces, extended) interfaces
    pub interfaces: Vec<Token>,
    /// Declared fields
    pub fields: Vec<Token>,
    /// Declared methods
    pub methods: Vec<Token>,
}

impl ClassDef {
    /// Returns `true` if instances of this class can be created.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        !self
            .flags
            .intersects(ClassFlags::ABSTRACT | ClassFlags::INTERFACE)
    }
}

/// A field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Token of this field
    pub token: Token,
    /// Simple name
    pub name: String,
    /// Declaring class
    pub owner: Token,
    /// Attributes
    pub flags: FieldFlags,
    /// Kind of value stored
    pub value_type: ValueType,
}

impl FieldDef {
    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }
}

/// A method definition with its optional SSA body.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Token of this method
    pub token: Token,
    /// Simple name
    pub name: String,
    /// Declaring class
    pub owner: Token,
    /// Attributes
    pub flags: MethodFlags,
    /// Declared parameters, receiver excluded
    pub param_count: usize,
    /// Body in SSA form; `None` for abstract, native and library methods
    pub body: Option<SsaFunction>,
}

impl MethodDef {
    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns `true` for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(MethodFlags::CONSTRUCTOR)
    }

    /// Returns the number of SSA arguments, receiver included.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        if self.is_static() {
            self.param_count
        } else {
            self.param_count + 1
        }
    }

    /// Returns `true` if calls to this method can be dynamically redirected.
    #[must_use]
    pub fn is_overridable(&self) -> bool {
        self.flags.contains(MethodFlags::VIRTUAL)
            && !self.flags.intersects(
                MethodFlags::STATIC | MethodFlags::PRIVATE | MethodFlags::CONSTRUCTOR,
            )
    }

    fn same_signature(&self, other: &MethodDef) -> bool {
        self.name == other.name && self.param_count == other.param_count
    }
}

/// The closed world of classes, fields and methods.
#[derive(Debug, Clone)]
pub struct Program {
    classes: Vec<ClassDef>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    object_class: Token,
    root_constructor: Token,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    /// Creates a program containing only the runtime root class and its
    /// constructor, whose body returns immediately.
    #[must_use]
    pub fn new() -> Self {
        let object_class = Token::type_def(1);
        let root_constructor = Token::method(1);
        let body = SsaFunctionBuilder::new(1).build_with(|f| {
            f.block(0, |b| b.ret());
        });

        Program {
            classes: vec![ClassDef {
                token: object_class,
                name: OBJECT_CLASS_NAME.to_string(),
                flags: ClassFlags::LIBRARY,
                super_class: None,
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: vec![root_constructor],
            }],
            fields: Vec::new(),
            methods: vec![MethodDef {
                token: root_constructor,
                name: CONSTRUCTOR_NAME.to_string(),
                owner: object_class,
                flags: MethodFlags::CONSTRUCTOR,
                param_count: 0,
                body: Some(body),
            }],
            object_class,
            root_constructor,
        }
    }

    /// Returns the runtime root class.
    #[must_use]
    pub fn object_class(&self) -> Token {
        self.object_class
    }

    /// Returns the runtime root constructor.
    #[must_use]
    pub fn root_constructor(&self) -> Token {
        self.root_constructor
    }

    /// Declares a class. A missing superclass defaults to the root class,
    /// except for interfaces.
    pub fn add_class(&mut self, name: &str, flags: ClassFlags, super_class: Option<Token>) -> Token {
        let token = Token::type_def(row_for(self.classes.len()));
        let super_class = if flags.contains(ClassFlags::INTERFACE) {
            super_class
        } else {
            Some(super_class.unwrap_or(self.object_class))
        };
        self.classes.push(ClassDef {
            token,
            name: name.to_string(),
            flags,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        });
        token
    }

    /// Records that `class` implements (or extends) `interface`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if either class is unknown.
    pub fn add_interface(&mut self, class: Token, interface: Token) -> Result<()> {
        self.resolve_class(interface)?;
        let def = self.class_mut(class)?;
        if !def.interfaces.contains(&interface) {
            def.interfaces.push(interface);
        }
        Ok(())
    }

    /// Declares a field on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `owner` is unknown.
    pub fn add_field(
        &mut self,
        owner: Token,
        name: &str,
        flags: FieldFlags,
        value_type: ValueType,
    ) -> Result<Token> {
        let token = Token::field(row_for(self.fields.len()));
        self.class_mut(owner)?.fields.push(token);
        self.fields.push(FieldDef {
            token,
            name: name.to_string(),
            owner,
            flags,
            value_type,
        });
        Ok(token)
    }

    /// Declares a method on `owner` taking `param_count` parameters besides
    /// the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `owner` is unknown.
    pub fn add_method(
        &mut self,
        owner: Token,
        name: &str,
        flags: MethodFlags,
        param_count: usize,
    ) -> Result<Token> {
        let token = Token::method(row_for(self.methods.len()));
        self.class_mut(owner)?.methods.push(token);
        self.methods.push(MethodDef {
            token,
            name: name.to_string(),
            owner,
            flags,
            param_count,
            body: None,
        });
        Ok(token)
    }

    /// Attaches an SSA body to `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] if `method` is unknown, or
    /// [`Error::Malformed`] if the body's argument count does not match the
    /// method's signature.
    pub fn set_body(&mut self, method: Token, body: SsaFunction) -> Result<()> {
        let def = self
            .methods
            .get_mut(index_of(method, TABLE_METHOD).ok_or(Error::MethodNotFound(method))?)
            .ok_or(Error::MethodNotFound(method))?;
        if body.num_args() != def.arg_count() {
            return Err(malformed_error!(
                "Body of {} takes {} arguments, signature declares {}",
                method,
                body.num_args(),
                def.arg_count()
            ));
        }
        def.body = Some(body);
        Ok(())
    }

    /// Returns all classes.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }

    /// Returns all methods.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods.iter()
    }

    /// Returns all fields.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }

    /// Looks up a class.
    #[must_use]
    pub fn class(&self, token: Token) -> Option<&ClassDef> {
        self.classes.get(index_of(token, TABLE_TYPE)?)
    }

    /// Looks up a field.
    #[must_use]
    pub fn field(&self, token: Token) -> Option<&FieldDef> {
        self.fields.get(index_of(token, TABLE_FIELD)?)
    }

    /// Looks up a method.
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodDef> {
        self.methods.get(index_of(token, TABLE_METHOD)?)
    }

    fn class_mut(&mut self, token: Token) -> Result<&mut ClassDef> {
        index_of(token, TABLE_TYPE)
            .and_then(|i| self.classes.get_mut(i))
            .ok_or(Error::TypeNotFound(token))
    }

    /// Resolves a class token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the class is unknown.
    pub fn resolve_class(&self, token: Token) -> Result<&ClassDef> {
        self.class(token).ok_or(Error::TypeNotFound(token))
    }

    /// Resolves a field reference to its unique definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] if the field is unknown.
    pub fn resolve_field(&self, token: Token) -> Result<&FieldDef> {
        self.field(token).ok_or(Error::FieldNotFound(token))
    }

    /// Resolves a method reference to its definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] if the method is unknown.
    pub fn resolve_method(&self, token: Token) -> Result<&MethodDef> {
        self.method(token).ok_or(Error::MethodNotFound(token))
    }

    /// Finds a method declared directly on `class` by name.
    #[must_use]
    pub fn find_method(&self, class: Token, name: &str) -> Option<Token> {
        self.class(class)?
            .methods
            .iter()
            .copied()
            .find(|&m| self.method(m).is_some_and(|def| def.name == name))
    }

    /// Returns the strict superclasses of `class`, nearest first.
    #[must_use]
    pub fn superclass_chain(&self, class: Token) -> Vec<Token> {
        let mut chain = Vec::new();
        let mut current = self.class(class).and_then(|c| c.super_class);
        while let Some(token) = current {
            // Cycles cannot be built through the public API, but stay bounded anyway
            if chain.contains(&token) || chain.len() > self.classes.len() {
                break;
            }
            chain.push(token);
            current = self.class(token).and_then(|c| c.super_class);
        }
        chain
    }

    /// Returns every interface `class` implements, directly or through
    /// superclasses and superinterfaces. The class itself is not included.
    #[must_use]
    pub fn all_interfaces(&self, class: Token) -> Vec<Token> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut pending: Vec<Token> = std::iter::once(class)
            .chain(self.superclass_chain(class))
            .filter_map(|c| self.class(c))
            .flat_map(|c| c.interfaces.iter().copied())
            .collect();

        while let Some(iface) = pending.pop() {
            if iface == class || !seen.insert(iface) {
                continue;
            }
            result.push(iface);
            if let Some(def) = self.class(iface) {
                pending.extend(def.interfaces.iter().copied());
            }
        }
        result
    }

    /// Returns `true` if `sub` is `sup`, extends it, or implements it.
    #[must_use]
    pub fn is_subtype(&self, sub: Token, sup: Token) -> bool {
        sub == sup
            || self.superclass_chain(sub).contains(&sup)
            || self.all_interfaces(sub).contains(&sup)
    }

    /// Returns every field an instance of `class` carries, inherited ones included.
    #[must_use]
    pub fn instance_fields(&self, class: Token) -> Vec<Token> {
        std::iter::once(class)
            .chain(self.superclass_chain(class))
            .filter_map(|c| self.class(c))
            .flat_map(|c| c.fields.iter().copied())
            .filter(|&f| self.field(f).is_some_and(|def| !def.is_static()))
            .collect()
    }

    /// Resolves the implementation a call on an instance whose exact runtime
    /// class is `exact_class` reaches.
    ///
    /// Non-overridable methods resolve to themselves as long as `exact_class`
    /// inherits them. Returns `None` if dispatch lands on an abstract method
    /// or finds nothing.
    #[must_use]
    pub fn resolve_virtual(&self, exact_class: Token, method: Token) -> Option<Token> {
        let declared = self.method(method)?;
        if declared.is_static() {
            return None;
        }
        if !declared.is_overridable() {
            return self
                .is_subtype(exact_class, declared.owner)
                .then_some(method);
        }

        for class in std::iter::once(exact_class).chain(self.superclass_chain(exact_class)) {
            let Some(def) = self.class(class) else {
                continue;
            };
            let found = def
                .methods
                .iter()
                .filter_map(|&m| self.method(m))
                .find(|m| !m.is_static() && m.same_signature(declared));
            if let Some(found) = found {
                return (!found.flags.contains(MethodFlags::ABSTRACT)).then_some(found.token);
            }
        }
        None
    }

    /// Resolves a call whose receiver's exact class is unknown.
    ///
    /// Static and direct calls resolve to the named method. Virtual and
    /// interface calls only resolve when the named method has a body-bearing
    /// definition and no subtype of its owner overrides it.
    #[must_use]
    pub fn resolve_single_target(&self, kind: CallKind, method: Token) -> Option<Token> {
        let declared = self.method(method)?;
        match kind {
            CallKind::Static => declared.is_static().then_some(method),
            CallKind::Direct => (!declared.is_static()).then_some(method),
            CallKind::Virtual | CallKind::Interface => {
                if declared.is_static() || declared.flags.contains(MethodFlags::ABSTRACT) {
                    return None;
                }
                if !declared.is_overridable() {
                    return Some(method);
                }
                let overridden = self.methods.iter().any(|m| {
                    m.token != method
                        && !m.is_static()
                        && m.same_signature(declared)
                        && m.owner != declared.owner
                        && self.is_subtype(m.owner, declared.owner)
                });
                (!overridden).then_some(method)
            }
        }
    }

    /// Returns the finalizer instances of `class` run, if any.
    ///
    /// The root class declares none.
    #[must_use]
    pub fn finalizer_of(&self, class: Token) -> Option<Token> {
        std::iter::once(class)
            .chain(self.superclass_chain(class))
            .filter_map(|c| self.class(c))
            .flat_map(|c| c.methods.iter().copied())
            .find(|&m| {
                self.method(m).is_some_and(|def| {
                    def.name == FINALIZER_NAME && def.param_count == 0 && !def.is_static()
                })
            })
    }

    /// Returns the class initializer declared by `class`.
    #[must_use]
    pub fn class_initializer_of(&self, class: Token) -> Option<Token> {
        self.class(class)?.methods.iter().copied().find(|&m| {
            self.method(m)
                .is_some_and(|def| def.flags.contains(MethodFlags::CLASS_INITIALIZER))
        })
    }

    /// Returns `true` if code in `from_class` may access `field`.
    #[must_use]
    pub fn is_field_accessible(&self, field: Token, from_class: Token) -> bool {
        self.field(field).is_some_and(|def| {
            !def.flags.contains(FieldFlags::PRIVATE) || def.owner == from_class
        })
    }

    /// Returns `true` if code in `from_class` may call `method`.
    #[must_use]
    pub fn is_method_accessible(&self, method: Token, from_class: Token) -> bool {
        self.method(method).is_some_and(|def| {
            !def.flags.contains(MethodFlags::PRIVATE) || def.owner == from_class
        })
    }
}

fn row_for(len: usize) -> u32 {
    u32::try_from(len + 1).unwrap_or(0x00FF_FFFF)
}

fn index_of(token: Token, table: u8) -> Option<usize> {
    if token.table() != table || token.row() == 0 {
        return None;
    }
    usize::try_from(token.row() - 1).ok()
}
