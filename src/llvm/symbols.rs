// This module builds the must-preserve symbol set for a bitcode module. collect_symbols walks
// the module's functions and global variables and classifies each one by definition kind:
// regular definitions, tentative (common) definitions, weak/linkonce definitions, local
// (internal/private) definitions, and undefined references (declarations and
// available_externally bodies). Compiler-internal `llvm.*` names are skipped.
// PreservedSymbolSet keeps only the externally visible definitions; mark_preserved
// then records them in the module's `llvm.compiler.used` list (merging with an existing
// list) so the optimisation pipeline cannot discard them before code generation.

//! Definitional symbols and their preservation.

use std::collections::HashSet;

use inkwell::module::{Linkage, Module};
use inkwell::values::{AsValueRef, PointerValue};
use inkwell::AddressSpace;
use llvm_sys::core::{LLVMGetNumOperands, LLVMGetOperand};

const COMPILER_USED: &str = "llvm.compiler.used";

/// How a module symbol is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Regular,
    Tentative,
    Weak,
    /// Defined with internal or private linkage; invisible outside the module.
    Local,
    Undefined,
}

impl SymbolKind {
    /// Externally visible definitions, the ones a linker may ask for.
    pub fn must_preserve(self) -> bool {
        matches!(self, Self::Regular | Self::Tentative | Self::Weak)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSymbol {
    pub name: String,
    pub kind: SymbolKind,
}

impl ModuleSymbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Names of the definitions a module must keep through code generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreservedSymbolSet {
    names: Vec<String>,
}

impl PreservedSymbolSet {
    pub fn from_symbols(symbols: &[ModuleSymbol]) -> Self {
        let mut seen = HashSet::new();
        let names = symbols
            .iter()
            .filter(|sym| sym.kind.must_preserve())
            .filter(|sym| seen.insert(sym.name.as_str()))
            .map(|sym| sym.name.clone())
            .collect();
        Self { names }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

fn kind_of(linkage: Linkage, is_definition: bool) -> SymbolKind {
    if !is_definition {
        return SymbolKind::Undefined;
    }
    match linkage {
        Linkage::Common => SymbolKind::Tentative,
        Linkage::WeakAny
        | Linkage::WeakODR
        | Linkage::LinkOnceAny
        | Linkage::LinkOnceODR
        | Linkage::LinkOnceODRAutoHide => SymbolKind::Weak,
        Linkage::Internal | Linkage::Private => SymbolKind::Local,
        Linkage::AvailableExternally | Linkage::ExternalWeak => SymbolKind::Undefined,
        _ => SymbolKind::Regular,
    }
}

/// Symbol table of `module` in declaration order.
pub fn collect_symbols(module: &Module<'_>) -> Vec<ModuleSymbol> {
    let functions = module.get_functions().map(|function| {
        let name = function.get_name().to_string_lossy().into_owned();
        let kind = kind_of(function.get_linkage(), function.count_basic_blocks() > 0);
        ModuleSymbol { name, kind }
    });
    let globals = module.get_globals().map(|global| {
        let name = global.get_name().to_string_lossy().into_owned();
        let kind = kind_of(global.get_linkage(), !global.is_declaration());
        ModuleSymbol { name, kind }
    });

    functions
        .chain(globals)
        .filter(|sym| !sym.name.is_empty() && !sym.name.starts_with("llvm."))
        .collect()
}

/// Entries of an existing `llvm.compiler.used` array.
fn used_entries<'ctx>(module: &Module<'ctx>) -> Vec<PointerValue<'ctx>> {
    let Some(init) = module
        .get_global(COMPILER_USED)
        .and_then(|global| global.get_initializer())
    else {
        return Vec::new();
    };

    let array = init.as_value_ref();
    // SAFETY: `array` is the live initializer of a global owned by `module`;
    // the operands of a constant array are its pointer-typed elements.
    unsafe {
        let count = u32::try_from(LLVMGetNumOperands(array)).unwrap_or(0);
        (0..count)
            .map(|idx| PointerValue::new(LLVMGetOperand(array, idx)))
            .collect()
    }
}

/// Record every preserved definition in `llvm.compiler.used`.
pub fn mark_preserved(module: &Module<'_>, set: &PreservedSymbolSet) {
    let mut entries = used_entries(module);
    let mut present: HashSet<_> = entries.iter().map(|value| value.as_value_ref()).collect();

    for name in set.names() {
        let value = module
            .get_function(name)
            .map(|function| function.as_global_value().as_pointer_value())
            .or_else(|| module.get_global(name).map(|global| global.as_pointer_value()));
        if let Some(value) = value {
            if present.insert(value.as_value_ref()) {
                entries.push(value);
            }
        }
    }

    if entries.is_empty() {
        return;
    }

    if let Some(existing) = module.get_global(COMPILER_USED) {
        // SAFETY: the old list is replaced below and nothing else refers to it.
        unsafe { existing.delete() };
    }

    let array = module
        .get_context()
        .ptr_type(AddressSpace::default())
        .const_array(&entries);
    let used = module.add_global(array.get_type(), None, COMPILER_USED);
    used.set_linkage(Linkage::Appending);
    used.set_section(Some("llvm.metadata"));
    used.set_initializer(&array);
    log::trace!("preserving {} symbols", entries.len());
}
