//! Location path parsing
//!
//! Raw location strings are `#`-separated hop lists such as
//! `PCIROOT(0)#PCI(1400)#USBROOT(0)#USB(1)#USB(4)`. Only `PCI(..)`,
//! `USBROOT(..)` and `USB(..)` hops are positional; their contents joined with
//! `-` form the port path (`1400-0-1-4` above).

/// Separator between hops in a port path
pub const HOP_SEPARATOR: char = '-';

const POSITIONAL_HOPS: [&str; 3] = ["USB(", "PCI(", "USBROOT("];

/// Derive the port path from a raw location string
///
/// Returns an empty string when no positional hop can be parsed.
pub fn parse_port_path(location: &str) -> String {
    location
        .split('#')
        .filter(|part| {
            POSITIONAL_HOPS.iter().any(|prefix| {
                part.get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            })
        })
        .filter_map(hop_value)
        .collect::<Vec<_>>()
        .join("-")
}

fn hop_value(part: &str) -> Option<&str> {
    let start = part.find('(')? + 1;
    let end = start + part[start..].find(')')?;
    (end > start).then(|| &part[start..end])
}

/// Port number of a port path: its final hop, when there are at least two
pub fn port_of(port_path: &str) -> &str {
    match port_path.rsplit_once(HOP_SEPARATOR) {
        Some((_, last)) => last,
        None => "",
    }
}

/// Split a port path into hops
pub fn hops(port_path: &str) -> Vec<&str> {
    if port_path.is_empty() {
        Vec::new()
    } else {
        port_path.split(HOP_SEPARATOR).collect()
    }
}
