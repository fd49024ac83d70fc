use std::env;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let llama_cpp_dir = env::var("LLAMA_CPP_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| manifest_dir.join("../../reference/llama.cpp"));
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    println!("cargo:rerun-if-env-changed=LLAMA_CPP_DIR");
    println!("cargo:rerun-if-env-changed=LLAMA_PREBUILT_DIR");

    // ── Determine build mode ──────────────────────────────────────────
    //
    // Prebuilt: `LLAMA_PREBUILT_DIR` holds `lib/` and `include/` from a
    //   previous llama.cpp build (the usual route for Android NDK builds).
    //
    // CMake (default): build the CPU backend from the source tree at
    //   `LLAMA_CPP_DIR` or `reference/llama.cpp`.

    let (lib_dir, include_dir) = if let Ok(prebuilt) = env::var("LLAMA_PREBUILT_DIR") {
        let prebuilt = PathBuf::from(&prebuilt);
        assert!(
            prebuilt.exists(),
            "LLAMA_PREBUILT_DIR={} does not exist",
            prebuilt.display()
        );
        let lib = if prebuilt.join("lib64").exists() {
            prebuilt.join("lib64")
        } else {
            prebuilt.join("lib")
        };
        println!(
            "cargo:warning=Using prebuilt llama.cpp from {}",
            prebuilt.display()
        );
        (lib, prebuilt.join("include"))
    } else {
        assert!(
            llama_cpp_dir.join("CMakeLists.txt").exists(),
            "llama.cpp source not found at {}. \
             Set LLAMA_CPP_DIR or LLAMA_PREBUILT_DIR.",
            llama_cpp_dir.display()
        );

        let mut cfg = cmake::Config::new(&llama_cpp_dir);
        cfg.define("BUILD_SHARED_LIBS", "OFF")
            .define("LLAMA_BUILD_SERVER", "OFF")
            .define("LLAMA_BUILD_TESTS", "OFF")
            .define("LLAMA_BUILD_EXAMPLES", "OFF")
            .define("LLAMA_BUILD_TOOLS", "OFF")
            .define("LLAMA_BUILD_COMMON", "OFF")
            .define("LLAMA_CURL", "OFF")
            // CPU only; no accelerator backends.
            .define("GGML_METAL", "OFF")
            .define("GGML_CUDA", "OFF")
            .define("GGML_VULKAN", "OFF");
        if target_os == "android" {
            // OpenMP is not shipped with every NDK.
            cfg.define("GGML_OPENMP", "OFF");
        }

        let dst = cfg.build();
        let lib = if dst.join("lib64").exists() {
            dst.join("lib64")
        } else {
            dst.join("lib")
        };
        (lib, dst.join("include"))
    };

    // ── Link libraries ────────────────────────────────────────────────
    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=static=llama");
    for name in &["ggml", "ggml-base", "ggml-cpu"] {
        if lib_dir.join(format!("lib{name}.a")).exists() {
            println!("cargo:rustc-link-lib=static={name}");
        }
    }

    match target_os.as_str() {
        "linux" => {
            println!("cargo:rustc-link-lib=stdc++");
            println!("cargo:rustc-link-lib=m");
            println!("cargo:rustc-link-lib=pthread");
            println!("cargo:rustc-link-lib=gomp"); // OpenMP (used by ggml-cpu)
        }
        "android" => {
            println!("cargo:rustc-link-lib=c++_shared");
            println!("cargo:rustc-link-lib=log");
            println!("cargo:rustc-link-lib=m");
        }
        "macos" | "ios" => {
            println!("cargo:rustc-link-lib=framework=Accelerate");
            println!("cargo:rustc-link-lib=c++");
        }
        "windows" => {
            println!("cargo:rustc-link-lib=msvcrt");
        }
        _ => {}
    }

    // ── Generate Rust bindings ────────────────────────────────────────
    let mut builder = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_arg(format!("-I{}", include_dir.display()));

    let ggml_include = llama_cpp_dir.join("ggml/include");
    if ggml_include.exists() {
        builder = builder.clang_arg(format!("-I{}", ggml_include.display()));
    }

    let bindings = builder
        .allowlist_function("llama_.*")
        .allowlist_function("ggml_.*")
        .allowlist_type("llama_.*")
        .allowlist_type("ggml_.*")
        .allowlist_var("LLAMA_.*")
        .allowlist_var("GGML_.*")
        .derive_default(true)
        .size_t_is_usize(true)
        .generate()
        .expect("Failed to generate bindings");

    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out.join("bindings.rs"))
        .expect("Failed to write bindings");

    println!("cargo:rerun-if-changed=wrapper.h");
}
