//! Common test utilities shared between integration tests

#![allow(dead_code)]

use wasmkit::builder::ModuleBuilder;
use wasmkit::runtime::{ImportObject, Instance, Value};

/// Finishes `mb` and instantiates it without imports.
pub fn instantiate(mb: ModuleBuilder) -> Instance {
    instantiate_with(mb, &ImportObject::new())
}

pub fn instantiate_with(mb: ModuleBuilder, imports: &ImportObject) -> Instance {
    let module = mb.finish().unwrap_or_else(|e| panic!("module build failed: {e}"));
    Instance::new(module, imports).unwrap_or_else(|e| panic!("instantiation failed: {e}"))
}

/// Invokes `name` and returns its single result.
pub fn call1(instance: &Instance, name: &str, args: &[Value]) -> Value {
    let results = instance
        .invoke(name, args)
        .unwrap_or_else(|e| panic!("invoke {name} failed: {e}"));
    assert_eq!(results.len(), 1, "{name} should return one value");
    results[0]
}
