// Copyright (c) The Chainyard Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::cidr::Ipv4Cidr;
use std::net::Ipv4Addr;

#[test]
fn test_parse_and_display() {
    let cidr: Ipv4Cidr = "10.0.0.0/24".parse().unwrap();
    assert_eq!(cidr.to_string(), "10.0.0.0/24");
    assert_eq!(cidr.prefix_len(), 24);

    // host bits are masked off
    let cidr: Ipv4Cidr = "10.0.0.17/24".parse().unwrap();
    assert_eq!(cidr.network_address(), Ipv4Addr::new(10, 0, 0, 0));
}

#[test]
fn test_parse_rejects_garbage() {
    assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
    assert!("10.0.0/24".parse::<Ipv4Cidr>().is_err());
    assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
    assert!("banana/24".parse::<Ipv4Cidr>().is_err());
}

#[test]
fn test_special_addresses() {
    let cidr: Ipv4Cidr = "10.0.0.0/24".parse().unwrap();
    assert_eq!(cidr.network_address(), Ipv4Addr::new(10, 0, 0, 0));
    assert_eq!(cidr.gateway_address(), Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(cidr.broadcast_address(), Ipv4Addr::new(10, 0, 0, 255));
}

#[test]
fn test_contains() {
    let cidr: Ipv4Cidr = "172.16.0.0/16".parse().unwrap();
    assert!(cidr.contains(Ipv4Addr::new(172, 16, 200, 9)));
    assert!(!cidr.contains(Ipv4Addr::new(172, 17, 0, 1)));
}

#[test]
fn test_overlaps() {
    let wide: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
    let narrow: Ipv4Cidr = "10.0.3.0/24".parse().unwrap();
    let disjoint: Ipv4Cidr = "192.168.0.0/24".parse().unwrap();
    assert!(wide.overlaps(&narrow));
    assert!(narrow.overlaps(&wide));
    assert!(!wide.overlaps(&disjoint));
}

#[test]
fn test_host_offsets() {
    let cidr: Ipv4Cidr = "10.0.0.0/24".parse().unwrap();
    let ip = Ipv4Addr::new(10, 0, 0, 42);
    assert_eq!(cidr.host_offset(ip), 42);

    let other: Ipv4Cidr = "172.20.0.0/16".parse().unwrap();
    assert_eq!(other.host_at(42), Ipv4Addr::new(172, 20, 0, 42));
}
