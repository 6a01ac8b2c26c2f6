// Copyright Redishake Project Contributors - SPDX Identifier: Apache-2.0

//! Text-reply parsers for the vendor-specific topology probes: `INFO
//! Cluster`'s `nodecount` line (Aliyun-style proxies), `INFO keyspace`'s
//! `db<i>:keys=<k>` lines, and `CLUSTER NODES`'s one-line-per-node table
//! (Tencent-style node enumeration).

/// One line of `CLUSTER NODES` output that was flagged as a master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNodeEntry {
    pub id: String,
    pub host: String,
    pub port: u16,
}

/// Parses `INFO Cluster`'s `nodecount:<N>` line. Requires `N >= 1`.
pub fn parse_node_count(info: &str) -> Result<u32, String> {
    let raw = find_info_value(info, "nodecount")
        .ok_or_else(|| "no `nodecount` field in INFO Cluster reply".to_string())?;
    let count: i64 = raw
        .parse()
        .map_err(|_| format!("malformed nodecount value `{raw}`"))?;
    if count < 1 {
        return Err(format!("source node count [{count}] illegal"));
    }
    Ok(count as u32)
}

/// Parses `INFO keyspace`'s `db<i>:keys=<k>,expires=...` lines, returning
/// every db index whose key count is greater than zero.
pub fn parse_keyspace(info: &str) -> Vec<u32> {
    let mut dbs = Vec::new();
    for line in info.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("db") else {
            continue;
        };
        let Some((index_str, fields)) = rest.split_once(':') else {
            continue;
        };
        let Ok(index) = index_str.parse::<u32>() else {
            continue;
        };
        let keys = fields
            .split(',')
            .find_map(|field| field.strip_prefix("keys="))
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        if keys > 0 {
            dbs.push(index);
        }
    }
    dbs
}

/// Parses `CLUSTER NODES` output, returning every line whose flags field
/// contains `master`.
pub fn parse_cluster_master_nodes(raw: &str) -> Result<Vec<ClusterNodeEntry>, String> {
    let mut masters = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() < 3 {
            continue;
        }
        let id = fields[0].to_string();
        let addr_field = fields[1];
        let flags = fields[2];
        if !flags.split(',').any(|f| f == "master") {
            continue;
        }
        // addr_field looks like `host:port@cport` or `host:port@cport,hostname`.
        let addr_only = addr_field.split(',').next().unwrap_or(addr_field);
        let host_port = addr_only.split('@').next().unwrap_or(addr_only);
        let Some((host, port_str)) = host_port.rsplit_once(':') else {
            continue;
        };
        let Ok(port) = port_str.parse::<u16>() else {
            continue;
        };
        masters.push(ClusterNodeEntry {
            id,
            host: host.to_string(),
            port,
        });
    }
    if masters.is_empty() {
        return Err("CLUSTER NODES reported no master nodes".to_string());
    }
    Ok(masters)
}

fn find_info_value<'a>(info: &'a str, key: &str) -> Option<&'a str> {
    info.lines().find_map(|line| {
        let line = line.trim();
        line.strip_prefix(key)?.strip_prefix(':')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_count() {
        let info = "# Cluster\r\ncluster_enabled:1\r\nnodecount:3\r\n";
        assert_eq!(parse_node_count(info), Ok(3));
    }

    #[test]
    fn rejects_missing_node_count() {
        let info = "# Cluster\r\ncluster_enabled:1\r\n";
        assert!(parse_node_count(info).is_err());
    }

    #[test]
    fn rejects_zero_node_count() {
        let info = "nodecount:0\r\n";
        assert!(parse_node_count(info).is_err());
    }

    #[test]
    fn keyspace_keeps_only_nonempty_dbs() {
        let info = "# Keyspace\r\ndb0:keys=5,expires=1,avg_ttl=0\r\ndb2:keys=0,expires=0\r\ndb5:keys=12,expires=0,avg_ttl=0\r\n";
        assert_eq!(parse_keyspace(info), vec![0, 5]);
    }

    #[test]
    fn keyspace_empty_info_yields_no_dbs() {
        assert_eq!(parse_keyspace("# Keyspace\r\n"), Vec::<u32>::new());
    }

    #[test]
    fn cluster_nodes_filters_to_masters() {
        let raw = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30001@31001 myself,master - 0 0 1 connected 0-5460
";
        let masters = parse_cluster_master_nodes(raw).unwrap();
        assert_eq!(masters.len(), 2);
        assert_eq!(masters[0].host, "127.0.0.1");
        assert_eq!(masters[0].port, 30002);
        assert_eq!(masters[1].id, "292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f");
        assert_eq!(masters[1].port, 30001);
    }

    #[test]
    fn cluster_nodes_errors_when_no_masters() {
        let raw = "07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave - 0 0 4 connected\n";
        assert!(parse_cluster_master_nodes(raw).is_err());
    }
}
