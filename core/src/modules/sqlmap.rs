use crate::core::target::Target;
use crate::modules::runner::ScanCommand;
use crate::utils;
use crate::AuditConfig;

/// Builds the discovery and dump command lines for the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProfile {
    pub program: String,
    pub level: u8,
    pub risk: u8,
    pub extra_args: Vec<String>,
}

impl ScanProfile {
    /// Resolves the configured scanner through `./tools`, `./` and `PATH`.
    /// An unresolvable name is kept as-is so the spawn failure surfaces at discovery.
    pub fn from_config(config: &AuditConfig) -> Self {
        let program = utils::get_binary_path(&config.scanner).unwrap_or_else(|| config.scanner.clone());
        Self {
            program,
            level: config.level,
            risk: config.risk,
            extra_args: config.extra_args.clone(),
        }
    }

    /// Database enumeration at the configured depth and risk.
    pub fn discovery(&self, target: &Target) -> ScanCommand {
        let mut args = vec![
            "-u".to_string(),
            target.as_str().to_string(),
            "--dbs".to_string(),
            format!("--level={}", self.level),
            format!("--risk={}", self.risk),
        ];
        args.extend(self.extra_args.iter().cloned());
        ScanCommand::new(self.program.clone(), args)
    }

    /// Full table and row extraction for one database.
    pub fn dump(&self, target: &Target, database: &str) -> ScanCommand {
        let mut args = vec![
            "-u".to_string(),
            target.as_str().to_string(),
            "-D".to_string(),
            database.to_string(),
            "--tables".to_string(),
            "--dump-all".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        ScanCommand::new(self.program.clone(), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ScanProfile {
        ScanProfile { program: "sqlmap".into(), level: 2, risk: 2, extra_args: vec![] }
    }

    #[test]
    fn test_discovery_command() {
        let target = Target::parse("http://a.com/?id=1").unwrap();
        let command = profile().discovery(&target);
        assert_eq!(command.program(), "sqlmap");
        assert_eq!(command.args(), ["-u", "http://a.com/?id=1", "--dbs", "--level=2", "--risk=2"]);
    }

    #[test]
    fn test_dump_command_keeps_target_as_single_argument() {
        let target = Target::parse("http://a.com/?id=1;$(id)").unwrap();
        let command = profile().dump(&target, "shop");
        assert_eq!(command.args()[1], target.as_str());
        assert_eq!(&command.args()[2..], ["-D", "shop", "--tables", "--dump-all"]);
    }

    #[test]
    fn test_extra_args_are_appended() {
        let mut p = profile();
        p.extra_args = vec!["--random-agent".into(), "--threads=4".into()];
        let target = Target::parse("http://a.com/?id=1").unwrap();
        let command = p.dump(&target, "shop");
        assert!(command.has_arg("--random-agent"));
        assert_eq!(command.args().last().map(String::as_str), Some("--threads=4"));
    }

    #[test]
    fn test_from_config_keeps_unresolvable_name() {
        let config = AuditConfig { scanner: "/no/such/sqlmap".into(), level: 3, risk: 1, ..AuditConfig::default() };
        let p = ScanProfile::from_config(&config);
        assert_eq!(p.program, "/no/such/sqlmap");
        assert_eq!(p.level, 3);
    }
}
