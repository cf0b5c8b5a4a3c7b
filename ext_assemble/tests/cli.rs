/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fs;
use std::path::Path;
use std::process::Command;

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

fn ext_assemble() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_ext_assemble"));
    command
        .env("EXT_ASSEMBLE_LOG", "debug")
        .env_remove("TRITON_DIST_AOT")
        .env_remove("EXT_STRICT_FEATURE_FLAGS")
        .env_remove("EXT_LOCATOR")
        .env_remove("EXT_AOT_LIB_DIRS")
        .env_remove("EXT_MODULE_NAME")
        .env_remove("EXT_BINDINGS_DIR")
        .env_remove("EXT_KERNEL_FILE")
        .env_remove("EXT_SOURCE_EXT")
        .env_remove("CUDA_LIB_DIR")
        .env_remove("CXXFLAGS");
    command
}

fn stdout_json(command: &mut Command) -> serde_json::Value {
    let output = command.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn test_config_prints_only_json() {
    let dir = tempfile::tempdir().unwrap();
    let json = stdout_json(
        ext_assemble()
            .env("EXT_SOURCE_DIR", dir.path())
            .env("CUDA_HOME", dir.path().join("cuda"))
            .arg("config"),
    );
    assert_eq!(json["source_dir"], dir.path().to_str().unwrap());
    assert_eq!(json["module_name"], "triton_distributed");
    assert_eq!(json["aot"], "disabled");
}

#[test]
fn test_plan_prints_only_json() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("site/pybind11/share/cmake/pybind11/pybind11Config.cmake"));
    fs::create_dir_all(root.join("site/pybind11/include/pybind11")).unwrap();
    touch(&root.join("site/torch/share/cmake/Torch/TorchConfig.cmake"));
    fs::create_dir_all(root.join("site/torch/include")).unwrap();
    for lib in ["libtorch.so", "libc10.so", "libtorch_python.so"] {
        touch(&root.join("site/torch/lib").join(lib));
    }
    fs::create_dir_all(root.join("python/include")).unwrap();
    fs::create_dir_all(root.join("cuda/include")).unwrap();
    touch(&root.join("cuda/lib64/libcudart.so"));
    touch(&root.join("project/csrc/ops.cc"));
    fs::write(
        root.join("deps.json"),
        r#"{"pybind11": "site/pybind11/share/cmake/pybind11", "torch": "site/torch/share/cmake", "python_include": "python/include", "ext_suffix": ".abi3.so"}"#,
    )
    .unwrap();

    let json = stdout_json(
        ext_assemble()
            .arg("--source-dir")
            .arg(root.join("project/csrc"))
            .args(["--locator", "manifest", "--manifest"])
            .arg(root.join("deps.json"))
            .arg("--cuda-home")
            .arg(root.join("cuda"))
            .arg("plan"),
    );
    assert_eq!(json["filename"], "triton_distributed.abi3.so");
    assert_eq!(json["units"].as_array().unwrap().len(), 1);
    assert_eq!(json["libraries"].as_array().unwrap().len(), 3);
    assert!(json["runtime_path"].is_null());
}
