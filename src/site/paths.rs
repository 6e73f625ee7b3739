// ABOUTME: Filesystem layout of a site root.
// ABOUTME: One place that knows where configs, logs and service data live.

use std::path::{Path, PathBuf};

/// Paths inside `<sites_root>/<url>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub root: PathBuf,
}

impl SitePaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join("docker-compose.yml")
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    /// Mounted at `/var/www` in nginx and php.
    pub fn app(&self) -> PathBuf {
        self.root.join("app")
    }

    pub fn htdocs(&self) -> PathBuf {
        self.app().join("htdocs")
    }

    pub fn config(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn nginx_conf(&self) -> PathBuf {
        self.config().join("nginx")
    }

    pub fn nginx_main_conf(&self) -> PathBuf {
        self.nginx_conf().join("conf.d").join("main.conf")
    }

    pub fn php_conf(&self) -> PathBuf {
        self.config().join("php")
    }

    pub fn php_custom_ini(&self) -> PathBuf {
        self.php_conf()
            .join("php")
            .join("conf.d")
            .join("custom.ini")
    }

    pub fn postfix_conf(&self) -> PathBuf {
        self.config().join("postfix")
    }

    pub fn nginx_logs(&self) -> PathBuf {
        self.root.join("logs").join("nginx")
    }

    pub fn php_logs(&self) -> PathBuf {
        self.root.join("logs").join("php")
    }

    pub fn services(&self) -> PathBuf {
        self.root.join("services")
    }

    pub fn postfix_spool(&self) -> PathBuf {
        self.services().join("postfix").join("spool")
    }

    pub fn postfix_ssl(&self) -> PathBuf {
        self.services().join("postfix").join("ssl")
    }

    pub fn mariadb(&self) -> PathBuf {
        self.services().join("mariadb")
    }

    pub fn db_data(&self) -> PathBuf {
        self.mariadb().join("data")
    }

    pub fn db_conf(&self) -> PathBuf {
        self.mariadb().join("conf")
    }

    pub fn db_my_cnf(&self) -> PathBuf {
        self.db_conf().join("my.cnf")
    }

    pub fn db_logs(&self) -> PathBuf {
        self.mariadb().join("logs")
    }
}
