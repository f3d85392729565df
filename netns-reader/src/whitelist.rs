//! The fixed set of read-only commands and arguments this helper is allowed to run, so that a
//! capability grant (`cap_sys_admin`) on the binary can never be leveraged into shell access.

use crate::error::ReaderError;

const ALLOWED_COMMANDS: &[(&str, &str)] = &[
    ("ip", "/usr/sbin/ip"),
    ("iptables-save", "/usr/sbin/iptables-save"),
    ("ip6tables-save", "/usr/sbin/ip6tables-save"),
    ("ipset", "/usr/sbin/ipset"),
    ("ss", "/usr/bin/ss"),
    ("netstat", "/usr/bin/netstat"),
];

const ALLOWED_IP_ARGS: &[&str] = &[
    "addr", "show", "route", "table", "rule", "link", "-j", "-json", "-details",
];

const ALLOWED_IPSET_ARGS: &[&str] = &["list", "-n", "-name"];

/// Resolves `command` to its absolute path, if it's on the whitelist.
pub fn command_path(command: &str) -> Result<&'static str, ReaderError> {
    ALLOWED_COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, path)| *path)
        .ok_or_else(|| ReaderError::CommandNotAllowed(command.to_string()))
}

/// Validates every argument against the whitelist for `command`; a numeric argument right
/// after `table` is accepted for `ip` regardless of value (a routing table id or name).
pub fn validate_args(command: &str, args: &[String]) -> Result<(), ReaderError> {
    match command {
        "ip" => {
            for (i, arg) in args.iter().enumerate() {
                let allowed = ALLOWED_IP_ARGS.contains(&arg.as_str())
                    || (i > 0 && args[i - 1] == "table");
                if !allowed {
                    return Err(ReaderError::ArgumentNotAllowed(arg.clone(), command.to_string()));
                }
            }
            Ok(())
        }
        "ipset" => {
            for arg in args {
                if !ALLOWED_IPSET_ARGS.contains(&arg.as_str()) {
                    return Err(ReaderError::ArgumentNotAllowed(arg.clone(), command.to_string()));
                }
            }
            Ok(())
        }
        "iptables-save" | "ip6tables-save" => {
            if !args.is_empty() {
                return Err(ReaderError::ArgumentNotAllowed(args[0].clone(), command.to_string()));
            }
            Ok(())
        }
        _ => Ok(()), // ss / netstat take no namespace-sensitive arguments worth restricting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_command() {
        assert_eq!(command_path("ip").unwrap(), "/usr/sbin/ip");
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(command_path("bash").is_err());
    }

    #[test]
    fn accepts_table_id_argument() {
        let args = vec!["route".to_string(), "show".to_string(), "table".to_string(), "200".to_string()];
        assert!(validate_args("ip", &args).is_ok());
    }

    #[test]
    fn rejects_disallowed_ip_argument() {
        let args = vec!["monitor".to_string()];
        assert!(validate_args("ip", &args).is_err());
    }

    #[test]
    fn iptables_save_takes_no_arguments() {
        assert!(validate_args("iptables-save", &["-c".to_string()]).is_err());
        assert!(validate_args("iptables-save", &[]).is_ok());
    }
}
