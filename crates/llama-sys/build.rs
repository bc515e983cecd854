use std::env;
use std::path::{Path, PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let apple = matches!(target_os.as_str(), "macos" | "ios");

    println!("cargo:rerun-if-env-changed=LLAMA_PREBUILT_DIR");
    println!("cargo:rerun-if-env-changed=LLAMA_CPP_DIR");

    // Source tree: `LLAMA_CPP_DIR`, or the vendored checkout at the
    // workspace root.
    let llama_cpp_dir = env::var("LLAMA_CPP_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| manifest_dir.join("../../vendor/llama.cpp"));

    // ── Build mode ────────────────────────────────────────────────────
    //
    // Prebuilt: `LLAMA_PREBUILT_DIR` points at `lib/` + `include/` from an
    //   earlier build (typically an xcframework slice for the device).
    // CMake (default): static build of the source tree above.
    let (lib_dir, include_dir) = match env::var("LLAMA_PREBUILT_DIR") {
        Ok(prebuilt) => {
            let prebuilt = PathBuf::from(prebuilt);
            assert!(
                prebuilt.exists(),
                "LLAMA_PREBUILT_DIR={} does not exist",
                prebuilt.display()
            );
            println!(
                "cargo:warning=Using prebuilt llama.cpp from {}",
                prebuilt.display()
            );
            (lib_subdir(&prebuilt), prebuilt.join("include"))
        }
        Err(_) => {
            assert!(
                llama_cpp_dir.join("CMakeLists.txt").exists(),
                "llama.cpp source not found at {}. Set LLAMA_CPP_DIR or \
                 run `git submodule update --init --recursive`.",
                llama_cpp_dir.display()
            );

            let mut cfg = cmake::Config::new(&llama_cpp_dir);
            cfg.define("BUILD_SHARED_LIBS", "OFF")
                .define("LLAMA_BUILD_SERVER", "OFF")
                .define("LLAMA_BUILD_TESTS", "OFF")
                .define("LLAMA_BUILD_EXAMPLES", "OFF")
                .define("LLAMA_BUILD_TOOLS", "OFF")
                .define("LLAMA_BUILD_COMMON", "OFF")
                .define("LLAMA_CURL", "OFF");

            if apple {
                // Keyboard extensions cannot load a .metallib from disk.
                cfg.define("GGML_METAL", "ON")
                    .define("GGML_METAL_EMBED_LIBRARY", "ON");
            }
            if target_os == "ios" {
                cfg.define("CMAKE_SYSTEM_NAME", "iOS")
                    .define("GGML_OPENMP", "OFF");
            }
            if env::var("CARGO_FEATURE_CUDA").is_ok() {
                cfg.define("GGML_CUDA", "ON");
            }
            if env::var("CARGO_FEATURE_VULKAN").is_ok() {
                cfg.define("GGML_VULKAN", "ON");
            }

            let dst = cfg.build();
            (lib_subdir(&dst), dst.join("include"))
        }
    };

    // ── Link libraries ────────────────────────────────────────────────
    println!("cargo:rustc-link-search=native={}", lib_dir.display());
    println!("cargo:rustc-link-lib=static=llama");

    for name in ["ggml", "ggml-base", "ggml-cpu", "ggml-blas", "ggml-metal"] {
        if lib_dir.join(format!("lib{name}.a")).exists() {
            println!("cargo:rustc-link-lib=static={name}");
        }
    }

    if env::var("CARGO_FEATURE_CUDA").is_ok() && lib_dir.join("libggml-cuda.a").exists() {
        println!("cargo:rustc-link-lib=static=ggml-cuda");
        for lib in ["cuda", "cublas", "culibos", "cudart"] {
            println!("cargo:rustc-link-lib={lib}");
        }
    }
    if env::var("CARGO_FEATURE_VULKAN").is_ok() && lib_dir.join("libggml-vulkan.a").exists() {
        println!("cargo:rustc-link-lib=static=ggml-vulkan");
        println!("cargo:rustc-link-lib=vulkan");
    }

    if apple {
        for fw in ["Accelerate", "Metal", "MetalKit", "Foundation"] {
            println!("cargo:rustc-link-lib=framework={fw}");
        }
        println!("cargo:rustc-link-lib=c++");
    } else if target_os == "linux" || target_os == "android" {
        println!("cargo:rustc-link-lib=stdc++");
        println!("cargo:rustc-link-lib=m");
        if target_os == "linux" {
            println!("cargo:rustc-link-lib=pthread");
            println!("cargo:rustc-link-lib=gomp");
        }
    }

    // ── Bindings ──────────────────────────────────────────────────────
    let mut builder = bindgen::Builder::default()
        .header("wrapper.h")
        .clang_arg(format!("-I{}", include_dir.display()));

    let ggml_include = llama_cpp_dir.join("ggml/include");
    if ggml_include.exists() {
        builder = builder.clang_arg(format!("-I{}", ggml_include.display()));
    }

    let bindings = builder
        .allowlist_function("llama_.*")
        .allowlist_type("llama_.*")
        .allowlist_type("ggml_log_level")
        .allowlist_var("LLAMA_.*")
        .derive_default(true)
        .size_t_is_usize(true)
        .generate()
        .expect("Failed to generate llama.cpp bindings");

    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    bindings
        .write_to_file(out.join("bindings.rs"))
        .expect("Failed to write bindings");

    println!("cargo:rerun-if-changed=wrapper.h");
}

fn lib_subdir(root: &Path) -> PathBuf {
    if root.join("lib64").exists() {
        root.join("lib64")
    } else {
        root.join("lib")
    }
}
