//! End-to-end tests of a compilation session: graph, traversal, link

mod common;

use common::{compile, func, kernel, module, session, session_with_source, CountingSource};
use nvcg_common::{AddressSpace, CodegenError, SourceLocation, UnitKind, Visibility};
use nvcg_ir::{
    decode_module, encode_module_with_version, GlobalVariable, Instruction, IrBuilder, IrType, IrVersion, Module,
    Value,
};
use nvcg_link::{BitcodeSource, InMemorySource, LinkOptions};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn both_modes() -> [LinkOptions; 2] {
    [LinkOptions::sequential(), LinkOptions::default()]
}

fn function_names(module: &Module) -> Vec<&str> {
    module.functions.iter().map(|f| f.name.as_str()).collect()
}

/// app: a kernel plus an exported device function; math: an exported
/// helper with a private dependency, and dead code in both
fn two_crates() -> Vec<(Module, UnitKind)> {
    let app = module(
        "app",
        vec![
            kernel("kernel_main", &["prepare", "dot"]),
            func("prepare", Visibility::Internal, &[]),
            func("api_entry", Visibility::External, &[]),
            func("dead", Visibility::Internal, &["dot"]),
        ],
    );
    let math = module(
        "math",
        vec![
            func("dot", Visibility::External, &["fma_step"]),
            func("fma_step", Visibility::Internal, &[]),
            func("unused", Visibility::Internal, &[]),
        ],
    );
    vec![(app, UnitKind::Crate), (math, UnitKind::Crate)]
}

#[test]
fn test_every_external_is_reachable() {
    for options in both_modes() {
        let mut session = session(&two_crates(), options);
        let output = session.run().unwrap();
        let linked = &output.linked.module;

        for name in ["kernel_main", "api_entry", "dot"] {
            let function = linked.get_function(name).unwrap();
            assert_eq!(function.visibility, Visibility::External);
        }
        assert_eq!(output.linked.kernels, vec!["kernel_main".to_string()]);
        assert_eq!(
            output.linked.abi_surface,
            vec!["kernel_main".to_string(), "api_entry".to_string(), "dot".to_string()]
        );
    }
}

#[test]
fn test_unreachable_bodies_are_absent() {
    let mut session = session(&two_crates(), LinkOptions::default());
    let output = session.run().unwrap();

    assert_eq!(
        function_names(&output.linked.module),
        vec!["kernel_main", "app__prepare", "api_entry", "dot", "math__fma_step"]
    );
    assert_eq!(output.stats.symbols_total, 7);
    assert_eq!(output.stats.symbols_reachable, 5);
    assert!(output.linked.module.functions.iter().all(|f| f.visibility == Visibility::External || f.name.contains("__")));
}

#[test]
fn test_linked_bitcode_decodes_to_output() {
    let mut session = session(&two_crates(), LinkOptions::default());
    let output = session.run().unwrap();
    assert_eq!(decode_module(&output.bitcode).unwrap(), output.linked.module);
}

#[test]
fn test_sequential_and_parallel_link_identically() {
    let [sequential, parallel] = both_modes();
    let a = session(&two_crates(), sequential).run().unwrap();
    let b = session(&two_crates(), parallel).run().unwrap();
    assert_eq!(a.linked, b.linked);
    assert_eq!(a.bitcode, b.bitcode);
}

#[test]
fn test_cyclic_dependency_across_modules() {
    let a = module("a", vec![kernel("ping", &["pong"])]);
    let b = module("b", vec![func("pong", Visibility::External, &["ping", "pong"])]);
    let modules = vec![(a, UnitKind::Crate), (b, UnitKind::Crate)];

    for options in both_modes() {
        let output = session(&modules, options).run().unwrap();
        assert_eq!(function_names(&output.linked.module), vec!["ping", "pong"]);
        assert_eq!(output.stats.reads_per_module["a"], 1);
        assert_eq!(output.stats.reads_per_module["b"], 1);
    }
}

#[test]
fn test_unreachable_module_is_never_loaded() {
    let app = module("app", vec![kernel("kernel_main", &[])]);
    let orphan = module("orphan", vec![func("helper", Visibility::Internal, &[])]);
    let (units, mut source) = compile(&[(app, UnitKind::Crate), (orphan, UnitKind::Crate)]);
    // reading this blob would fail the session
    source.insert("orphan", b"garbage".to_vec());

    for options in both_modes() {
        let counting = Arc::new(CountingSource::new(source.clone(), Duration::ZERO));
        let mut session = session_with_source(units.clone(), counting.clone(), options);
        let output = session.run().unwrap();

        assert_eq!(counting.reads("orphan"), 0);
        assert_eq!(output.stats.reads_per_module["orphan"], 0);
        assert_eq!(output.stats.modules_loaded, 1);
        assert_eq!(session.reporter().warning_count(), 1);
    }
}

#[test]
fn test_concurrent_reaches_read_bitcode_once() {
    let core_fns: Vec<String> = (0..16).map(|i| format!("core_{i}")).collect();
    let core = module(
        "core",
        core_fns.iter().map(|name| func(name, Visibility::External, &[])).collect(),
    );
    let mut modules = vec![(core, UnitKind::Crate)];
    for (i, name) in core_fns.iter().enumerate() {
        let kernel_name = format!("kernel_{i}");
        modules.push((module(&format!("app_{i}"), vec![kernel(&kernel_name, &[name.as_str()])]), UnitKind::Crate));
    }

    let (units, source) = compile(&modules);
    let counting = Arc::new(CountingSource::new(source, Duration::from_millis(20)));
    let options = LinkOptions {
        threads: Some(8),
        ..LinkOptions::default()
    };
    let output = session_with_source(units, counting.clone(), options).run().unwrap();

    assert_eq!(counting.reads("core"), 1);
    assert_eq!(output.stats.reads_per_module["core"], 1);
    assert!(output.stats.reads_per_module.values().all(|&reads| reads == 1));
    assert_eq!(output.linked.kernels.len(), 16);
}

#[test]
fn test_duplicate_kernel_main_fails_linking() {
    let a = module("a", vec![kernel("kernel_main", &[])]);
    let b = module("b", vec![kernel("kernel_main", &[])]);

    for options in both_modes() {
        let mut session = session(&[(a.clone(), UnitKind::Crate), (b.clone(), UnitKind::Crate)], options);
        assert_eq!(
            session.run().unwrap_err(),
            CodegenError::duplicate_external("kernel_main", "a", "b")
        );
        assert!(session.reporter().has_errors());
    }
}

#[test]
fn test_duplicate_external_fails_even_when_unreached() {
    let app = module("app", vec![kernel("kernel_main", &[])]);
    let extra = module("extra", vec![func("kernel_main", Visibility::External, &[])]);
    let mut session = session(&[(app, UnitKind::Crate), (extra, UnitKind::Library)], LinkOptions::default());

    let err = session.run().unwrap_err();
    assert_eq!(err.kind_name(), "DuplicateExternalSymbol");
}

#[test]
fn test_shared_to_constant_cast_fails_before_linking() {
    let mut builder = IrBuilder::new();
    builder.create_function("kernel_main", IrType::Void);
    builder.create_block().unwrap();
    builder.set_location(SourceLocation::new("kernel.rs", 7, 9)).unwrap();
    builder
        .build_cast(Value::Global("tile".to_string()), IrType::ptr(IrType::F32, AddressSpace::Constant))
        .unwrap();
    builder.build_return(None).unwrap();
    let mut main = builder.finish_function().unwrap();
    main.is_kernel = true;
    main.visibility = Visibility::External;

    let mut app = module("app", vec![main]);
    app.add_global(GlobalVariable::new("tile", IrType::F32, AddressSpace::Shared));

    let mut session = session(&[(app, UnitKind::Crate)], LinkOptions::default());
    let err = session.analyze().err().unwrap();
    assert_eq!(
        err,
        CodegenError::invalid_cast(
            SourceLocation::new("kernel.rs", 7, 9),
            "kernel_main",
            AddressSpace::Shared,
            AddressSpace::Constant
        )
    );
    assert_eq!(session.reporter().diagnostics()[0].span.start.line, 7);
}

#[test]
fn test_argument_space_checked_against_declaration() {
    let global_f32 = IrType::ptr(IrType::F32, AddressSpace::Global);

    let mut builder = IrBuilder::new();
    builder.create_function("fill", IrType::Void);
    builder.add_parameter(global_f32.clone()).unwrap();
    builder.create_block().unwrap();
    builder.build_return(None).unwrap();
    let mut fill = builder.finish_function().unwrap();
    fill.visibility = Visibility::External;
    let lib = module("lib", vec![fill.clone()]);

    // app carries a declaration of `fill` and calls it with `buffer`
    let app_calling = |buffer: &str| {
        let mut builder = IrBuilder::new();
        builder.create_function("kernel_main", IrType::Void);
        builder.create_block().unwrap();
        builder.build_call("fill", vec![Value::Global(buffer.to_string())], IrType::Void).unwrap();
        builder.build_return(None).unwrap();
        let mut main = builder.finish_function().unwrap();
        main.is_kernel = true;
        main.visibility = Visibility::External;

        let mut declaration = fill.clone();
        declaration.blocks.clear();
        let mut app = module("app", vec![main, declaration]);
        app.add_global(GlobalVariable::new("tile", IrType::F32, AddressSpace::Shared));
        app.add_global(GlobalVariable::new("out", IrType::F32, AddressSpace::Global));
        app
    };

    let modules = [(app_calling("out"), UnitKind::Crate), (lib.clone(), UnitKind::Crate)];
    assert!(session(&modules, LinkOptions::default()).run().is_ok());

    let modules = [(app_calling("tile"), UnitKind::Crate), (lib, UnitKind::Crate)];
    let err = session(&modules, LinkOptions::default()).analyze().err().unwrap();
    assert!(
        matches!(
            err,
            CodegenError::InvalidAddressSpaceCast { from: AddressSpace::Shared, to: AddressSpace::Global, .. }
        ),
        "{err}"
    );
}

#[test]
fn test_unproven_conversion_is_runtime_checked() {
    let mut builder = IrBuilder::new();
    builder.create_function("kernel_main", IrType::Void);
    let generic_ptr = IrType::ptr(IrType::F32, AddressSpace::Generic);
    let p = builder.add_parameter(generic_ptr.clone()).unwrap();
    builder.create_block().unwrap();
    builder.build_addrspace_cast(Value::Temp(p), &generic_ptr, AddressSpace::Global).unwrap();
    builder.build_return(None).unwrap();
    let mut main = builder.finish_function().unwrap();
    main.is_kernel = true;
    main.visibility = Visibility::External;
    let modules = vec![(module("app", vec![main]), UnitKind::Crate)];

    let output = session(&modules, LinkOptions::default()).run().unwrap();
    assert_eq!(output.stats.runtime_checks, 1);
    let body = output.linked.module.get_function("kernel_main").unwrap();
    assert!(matches!(body.blocks[0].instructions[0], Instruction::CheckedAddrSpaceCast { .. }));

    let strict = LinkOptions {
        strict_provenance: true,
        ..LinkOptions::default()
    };
    assert_eq!(session(&modules, strict).run().unwrap_err().kind_name(), "InvalidAddressSpaceCast");
}

#[test]
fn test_dispatch_fans_out_to_every_implementation() {
    let mut builder = IrBuilder::new();
    builder.create_function("render", IrType::Void);
    builder.create_block().unwrap();
    builder.build_dispatch("Shape::area", Value::Undef, vec![], IrType::F32).unwrap();
    builder.build_return(None).unwrap();
    let mut render = builder.finish_function().unwrap();
    render.is_kernel = true;
    render.visibility = Visibility::External;

    let mut circle = func("circle_area", Visibility::Internal, &["pi"]);
    circle.implements.push("Shape::area".to_string());
    let mut square = func("square_area", Visibility::Internal, &[]);
    square.implements.push("Shape::area".to_string());
    let geometry = module(
        "geometry",
        vec![
            circle,
            square,
            func("pi", Visibility::Internal, &[]),
            func("perimeter", Visibility::Internal, &[]),
        ],
    );
    let modules = vec![(module("app", vec![render]), UnitKind::Crate), (geometry, UnitKind::Crate)];

    for options in both_modes() {
        let output = session(&modules, options).run().unwrap();
        let linked = &output.linked.module;
        assert_eq!(
            linked.dispatch_tables["Shape::area"],
            vec!["geometry__circle_area".to_string(), "geometry__square_area".to_string()]
        );
        assert!(linked.get_function("geometry__pi").is_some());
        assert!(linked.get_function("geometry__perimeter").is_none());
    }
}

#[test]
fn test_library_is_linked_only_where_referenced() {
    let libdevice = module(
        "libdevice",
        vec![
            func("__nv_sinf", Visibility::External, &[]),
            func("__nv_cosf", Visibility::External, &[]),
        ],
    );

    let uses_sin = module("app", vec![kernel("kernel_main", &["__nv_sinf"])]);
    let output = session(&[(uses_sin, UnitKind::Crate), (libdevice.clone(), UnitKind::Library)], LinkOptions::default())
        .run()
        .unwrap();
    assert_eq!(function_names(&output.linked.module), vec!["kernel_main", "__nv_sinf"]);
    assert_eq!(output.linked.module.get_function("__nv_sinf").unwrap().visibility, Visibility::Internal);
    assert_eq!(output.stats.reads_per_module["libdevice"], 1);

    let plain = module("app", vec![kernel("kernel_main", &[])]);
    let output = session(&[(plain, UnitKind::Crate), (libdevice, UnitKind::Library)], LinkOptions::default())
        .run()
        .unwrap();
    assert_eq!(output.stats.reads_per_module["libdevice"], 0);
}

#[test]
fn test_unresolved_symbol_fails_graph_build() {
    let app = module("app", vec![kernel("kernel_main", &["missing_fn"])]);
    let err = session(&[(app, UnitKind::Crate)], LinkOptions::default()).run().unwrap_err();
    assert_eq!(err, CodegenError::unresolved("kernel_main", "missing_fn"));
}

#[test]
fn test_bad_bitcode_fails_session() {
    let app = module("app", vec![kernel("kernel_main", &["dot"])]);
    let math = module("math", vec![func("dot", Visibility::External, &[])]);
    let (units, source) = compile(&[(app, UnitKind::Crate), (math.clone(), UnitKind::Crate)]);

    let old = encode_module_with_version(&math, IrVersion::new(1, 5)).unwrap();
    let cases: Vec<(Option<Vec<u8>>, &str)> = vec![
        (None, "no bitcode registered"),
        (Some(b"NVCB".to_vec()), "truncated"),
        (Some(old), "1.5"),
    ];

    for (blob, expected) in cases {
        let mut source = source.clone();
        match blob {
            Some(bytes) => source.insert("math", bytes),
            None => source = InMemorySource::new().with_blob("app", source.read("app").unwrap()),
        }
        let mut session = session_with_source(units.clone(), Arc::new(source), LinkOptions::default());
        let err = session.run().unwrap_err();
        assert_eq!(err.kind_name(), "ModuleLoadFailure");
        assert!(err.to_string().contains(expected), "{err}");
    }
}

#[test]
fn test_global_references_survive_link() {
    let mut builder = IrBuilder::new();
    builder.create_function("kernel_main", IrType::Void);
    builder.create_block().unwrap();
    let value = builder.build_load(Value::Global("coeffs".to_string()), IrType::F32).unwrap();
    builder.build_store(Value::Temp(value), Value::Global("scratch".to_string())).unwrap();
    builder.build_return(None).unwrap();
    let mut main = builder.finish_function().unwrap();
    main.is_kernel = true;
    main.visibility = Visibility::External;

    let mut app = module("app", vec![main]);
    app.add_global(GlobalVariable::new("coeffs", IrType::F32, AddressSpace::Constant).constant());
    app.add_global(GlobalVariable::new("scratch", IrType::F32, AddressSpace::Shared));
    app.add_global(GlobalVariable::new("stale", IrType::F32, AddressSpace::Global));

    let output = session(&[(app, UnitKind::Crate)], LinkOptions::default()).run().unwrap();
    let linked = &output.linked;
    assert_eq!(linked.host_globals, vec!["app__coeffs".to_string()]);
    assert_eq!(linked.block_scoped, vec!["app__scratch".to_string()]);
    assert!(linked.module.get_global("app__stale").is_none());

    let refs: Vec<String> = linked.module.get_function("kernel_main").unwrap().referenced_symbols().into_iter().collect();
    assert_eq!(refs, vec!["app__coeffs".to_string(), "app__scratch".to_string()]);
}
