use std::str::FromStr;

use prjfabric_memory::{assert_isomorphic, Design, SourceTable};
use prjfabric_opt::split_memories;

fn split(mut design: Design) -> Design {
    let resolver = SourceTable::collect(&design);
    split_memories(&mut design, &resolver);
    design
}

#[test]
fn test_split_identity() {
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03\n",
        "  read #0 \"one\" [ &0+0:4 ]\n",
        "  read #1 \"two\" [ &0+2:2 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_disjoint() {
    let mut design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"a\" bytes 00 01\n",
        "  alloc &1 \"b\" bytes 02 03\n",
        "  read #0 \"ra\" [ &0+0:2 ]\n",
        "  read #1 \"rb\" [ &1+0:2 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "task \"main\" { #0 #1 }\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"a\" bytes 00 01\n",
        "  read #0 \"ra\" [ &0+0:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"b\" bytes 02 03\n",
        "  read #1 \"rb\" [ &1+0:2 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
        "task \"main\" { #0 #1 }\n",
    ))
    .unwrap();
    let resolver = SourceTable::collect(&design);
    let created = split_memories(&mut design, &resolver);
    assert_eq!(created, 2);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_bridged_accesses_stay() {
    // "mid" can alias both "lo" and "hi", which chains all three accesses
    // into a single partition
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01 02 03 04 05 06 07\n",
        "  read #0 \"lo\" [ &0+0:2 ]\n",
        "  read #1 \"hi\" [ &0+4:2 ]\n",
        "  read #2 \"mid\" [ &0+1:4 ]\n",
        "  port 0 { #0 #1 #2 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_copies_whole_allocations() {
    // the two fields never alias, so the accesses part ways, but each
    // partition carries a full copy of the allocation it touches
    let design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"pair\" { bytes 00 01 bytes 02 03 }\n",
        "  read #0 \"first\" [ &0+0:2 ]\n",
        "  read #1 \"second\" [ &0+2:2 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"pair\" { bytes 00 01 bytes 02 03 }\n",
        "  read #0 \"first\" [ &0+0:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"pair\" { bytes 00 01 bytes 02 03 }\n",
        "  read #1 \"second\" [ &1+2:2 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
    ))
    .unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_shared_source_merges() {
    // "ra" and "rb" touch disjoint bytes, but the same pointer can steer
    // either of them, so they cannot be torn apart
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"a\" bytes 00 01\n",
        "  alloc &1 \"b\" bytes 02 03\n",
        "  read #0 \"ra\" [ &0+0:2 ] via [ $0 ]\n",
        "  read #1 \"rb\" [ &1+0:2 ] via [ $0 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &2 \"p\" ptr $0:4 -> &0\n",
        "  read #2 \"fetch\" [ &2+0:4 ]\n",
        "  port 0 { #2 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_retargets_pointer() {
    let design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"p\" ptr $0:4 -> &1+2:2\n",
        "  read #0 \"fetch\" [ &0+0:4 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"a\" bytes 00 01 02 03\n",
        "  alloc &2 \"b\" bytes 04 05\n",
        "  read #1 \"ra\" [ &1+2:2 ] via [ $0 ]\n",
        "  read #2 \"rb\" [ &2+0:2 ]\n",
        "  port 0 { #1 #2 }\n",
        "}\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"p\" ptr $0:4 -> &1+2:2\n",
        "  read #0 \"fetch\" [ &0+0:4 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &1 \"a\" bytes 00 01 02 03\n",
        "  read #1 \"ra\" [ &1+2:2 ] via [ $0 ]\n",
        "  port 0 { #1 }\n",
        "}\n",
        "memory %2 {\n",
        "  alloc &2 \"b\" bytes 04 05\n",
        "  read #2 \"rb\" [ &2+0:2 ]\n",
        "  port 0 { #2 }\n",
        "}\n",
    ))
    .unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_access_without_locations() {
    let design = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01\n",
        "  read #0 \"real\" [ &0+0:2 ]\n",
        "  read #1 \"phantom\" [ ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
    ))
    .unwrap();
    let gold = Design::from_str(concat!(
        "memory %0 {\n",
        "  alloc &0 \"buf\" bytes 00 01\n",
        "  read #0 \"real\" [ &0+0:2 ]\n",
        "  port 0 { #0 }\n",
        "}\n",
        "memory %1 {\n",
        "  read #1 \"phantom\" [ ]\n",
        "  port 0 { #1 }\n",
        "}\n",
    ))
    .unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_keeps_address_sources() {
    // nothing in the first memory reaches "p", but splitting would drop it
    // together with the pointer steering "load"
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"a\" bytes 00 01\n",
        "  alloc &1 \"b\" bytes 02 03\n",
        "  alloc &2 \"p\" ptr $0:4 -> &3\n",
        "  read #0 \"ra\" [ &0+0:2 ]\n",
        "  read #1 \"rb\" [ &1+0:2 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &3 \"ext\" bytes aa bb\n",
        "  read #2 \"load\" [ &3*:2 ] via [ $0 ]\n",
        "  port 0 { #2 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_keeps_targeted_allocations() {
    // no access reaches "c", but a live pointer still targets its bytes, so
    // the memory cannot be torn apart
    let source = concat!(
        "memory %0 {\n",
        "  alloc &0 \"a\" bytes 00 01\n",
        "  alloc &1 \"b\" bytes 02 03\n",
        "  alloc &2 \"c\" bytes 04 05\n",
        "  read #0 \"ra\" [ &0+0:2 ]\n",
        "  read #1 \"rb\" [ &1+0:2 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
        "memory %1 {\n",
        "  alloc &3 \"p\" ptr $0:4 -> &2+0:1\n",
        "  read #2 \"fetch\" [ &3+0:4 ]\n",
        "  port 0 { #2 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}

#[test]
fn test_split_skips_implemented() {
    let source = concat!(
        "memory %0 fixed {\n",
        "  alloc &0 \"a\" bytes 00 01\n",
        "  alloc &1 \"b\" bytes 02 03\n",
        "  read #0 \"ra\" [ &0+0:2 ]\n",
        "  read #1 \"rb\" [ &1+0:2 ]\n",
        "  port 0 { #0 #1 }\n",
        "}\n",
    );
    let design = Design::from_str(source).unwrap();
    let gold = Design::from_str(source).unwrap();
    let design = split(design);
    assert_isomorphic!(design, gold);
}
