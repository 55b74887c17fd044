use std::str::FromStr;

use prjfabric_memory::{assert_isomorphic, Design};
use prjfabric_opt::{balance_contexts, balance_reads, DualPortOptions};

#[test]
fn test_balance_reads() {
    let mut design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"r1\" [ &0+0:1 ]\n",
        "  read #1 \"r2\" [ &0+1:1 ]\n",
        "  read #2 \"r3\" [ &0+2:1 ]\n",
        "  write #3 \"w1\" [ &0+3:1 ]\n",
        "  port 0 { #0 #1 #2 #3 }\n",
        "}\n",
        "task \"main\" { #0 #1 #2 #3 }\n",
    ))
    .unwrap();
    // the first and third read share the original port with the write, the
    // second read moves to the new port
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"r1\" [ &0+0:1 ]\n",
        "  read #1 \"r2\" [ &0+1:1 ]\n",
        "  read #2 \"r3\" [ &0+2:1 ]\n",
        "  write #3 \"w1\" [ &0+3:1 ]\n",
        "  port 0 { #3 #0 #2 }\n",
        "  port 1 { #1 }\n",
        "}\n",
        "task \"main\" { #0 #1 #2 #3 }\n",
    ))
    .unwrap();
    let options = DualPortOptions { max_lut_bytes: 0, ..DualPortOptions::default() };
    balance_reads(&mut design, &options);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_balance_reads_skips_lut_sized() {
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"r1\" [ &0+0:1 ]\n",
        "  read #1 \"r2\" [ &0+1:1 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "task \"main\" { #0 #1 }\n",
    );
    let mut design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    balance_reads(&mut design, &DualPortOptions::default());
    assert_isomorphic!(design, gold);
}

#[test]
fn test_balance_reads_needs_two_reads_in_one_task() {
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"r1\" [ &0+0:1 ]\n",
        "  read #1 \"r2\" [ &0+1:1 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "task \"first\" { #0 }\n",
        "task \"second\" { #1 }\n",
    );
    let mut design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let options = DualPortOptions { max_lut_bytes: 0, ..DualPortOptions::default() };
    balance_reads(&mut design, &options);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_balance_reads_suppressed() {
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"r1\" [ &0+0:1 ]\n",
        "  read #1 \"r2\" [ &0+1:1 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "task \"main\" { #0 #1 }\n",
    );
    let mut design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let options = DualPortOptions { max_lut_bytes: 0, suppress: true, ..DualPortOptions::default() };
    balance_reads(&mut design, &options);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_balance_contexts() {
    let mut design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"a1\" [ &0+0:1 ]\n",
        "  write #1 \"a2\" [ &0+1:1 ]\n",
        "  read #2 \"a3\" [ &0+2:1 ]\n",
        "  port 0 { #0 #1 #2 }\n",
        "}\n",
        "task \"main\" { #0 #1 #2 }\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"a1\" [ &0+0:1 ]\n",
        "  write #1 \"a2\" [ &0+1:1 ]\n",
        "  read #2 \"a3\" [ &0+2:1 ]\n",
        "  port 0 { #0 #2 }\n",
        "  port 1 { #1 }\n",
        "}\n",
        "task \"main\" { #0 #1 #2 }\n",
    ))
    .unwrap();
    balance_contexts(&mut design, &DualPortOptions::default());
    assert_isomorphic!(design, gold);
}

#[test]
fn test_balance_contexts_lut() {
    let mut design = Design::from_str(concat!(
        "memory %0 lut {\n",
        "  alloc &0 \"buf\" bytes 00 01\n",
        "  write #0 \"w1\" [ &0+0:1 ]\n",
        "  read #1 \"r1\" [ &0+0:1 ]\n",
        "  read #2 \"r2\" [ &0+1:1 ]\n",
        "  port 0 { #0 #1 #2 }\n",
        "}\n",
        "task \"main\" { #0 #1 #2 }\n",
    ))
    .unwrap();
    // the write cannot take the read-only slot, so it is pushed to the write
    // port and the slot stays open for the first read
    let gold = Design::from_str(concat!(
        "memory %0 lut {\n",
        "  alloc &0 \"buf\" bytes 00 01\n",
        "  write #0 \"w1\" [ &0+0:1 ]\n",
        "  read #1 \"r1\" [ &0+0:1 ]\n",
        "  read #2 \"r2\" [ &0+1:1 ]\n",
        "  port 0 { #0 #2 }\n",
        "  port 1 ro { #1 }\n",
        "}\n",
        "task \"main\" { #0 #1 #2 }\n",
    ))
    .unwrap();
    let options = DualPortOptions { allow_lut: true, ..DualPortOptions::default() };
    balance_contexts(&mut design, &options);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_balance_contexts_lut_disallowed() {
    let source = concat!(
        "memory %0 lut {\n",
        "  alloc &0 \"buf\" bytes 00 01\n",
        "  read #0 \"r1\" [ &0+0:1 ]\n",
        "  read #1 \"r2\" [ &0+1:1 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "task \"main\" { #0 #1 }\n",
    );
    let mut design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    balance_contexts(&mut design, &DualPortOptions::default());
    assert_isomorphic!(design, gold);
}

#[test]
fn test_balance_contexts_needs_busy_task() {
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01\n",
        "  read #0 \"r1\" [ &0+0:1 ]\n",
        "  read #1 \"r2\" [ &0+1:1 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "task \"first\" { #0 }\n",
        "task \"second\" { #1 }\n",
    );
    let mut design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    balance_contexts(&mut design, &DualPortOptions::default());
    assert_isomorphic!(design, gold);
}
