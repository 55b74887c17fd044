fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    let mut git_hash = String::from("unknown");
    if let Ok(git_head) = std::fs::read_to_string("../.git/HEAD") {
        if git_head.starts_with("ref: ") {
            let git_ref = git_head["ref: ".len()..].trim_end();
            println!("cargo:rerun-if-changed=.git/{git_ref}");
            if let Ok(hash) = std::fs::read_to_string(format!("../.git/{git_ref}")) {
                git_hash = hash;
            }
        } else {
            git_hash = git_head;
        }
    }
    println!("cargo:rustc-env=GIT_HASH={}", git_hash.trim_end());
}
