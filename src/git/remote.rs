use git2::{
    cert::Cert, AutotagOption, CertificateCheckStatus, Config, Cred, CredentialType, FetchOptions,
    RemoteCallbacks,
};
use log::trace;
use ssh_key::{known_hosts::HostPatterns, KnownHosts};

const GLOBAL_KNOWN_HOSTS: &str = "/etc/ssh/ssh_known_hosts";

/// Authentication and host verification used for every fetch from `origin`.
pub struct RemoteAuth {
    git_config: Config,
    known_hosts: String,
}

impl RemoteAuth {
    pub fn new(git_config: Config) -> Self {
        Self {
            git_config,
            known_hosts: GLOBAL_KNOWN_HOSTS.to_owned(),
        }
    }

    pub fn fetch_options(&self) -> FetchOptions<'_> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username, allowed_types| {
            trace!(
                "Requested credentials for {}, username {:?}, allowed types {:?}",
                url,
                username,
                allowed_types
            );
            if allowed_types.contains(CredentialType::USERNAME) {
                return Cred::username("git");
            }
            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Cred::credential_helper(&self.git_config, url, username);
            }
            Err(git2::Error::from_str("no valid authentication available"))
        });

        callbacks.certificate_check(|certificate, host| self.check_certificate(certificate, host));

        let mut fetch_options = FetchOptions::new();
        fetch_options
            .remote_callbacks(callbacks)
            .download_tags(AutotagOption::None);
        fetch_options
    }

    fn check_certificate(
        &self,
        certificate: &Cert<'_>,
        host: &str,
    ) -> Result<CertificateCheckStatus, git2::Error> {
        let Some(hostkey) = certificate.as_hostkey().and_then(|h| h.hostkey()) else {
            return Ok(CertificateCheckStatus::CertificatePassthrough);
        };

        let entries = match KnownHosts::read_file(&self.known_hosts) {
            Ok(entries) => entries,
            Err(error) => {
                trace!("Could not load {}: {}", self.known_hosts, error);
                return Ok(CertificateCheckStatus::CertificatePassthrough);
            }
        };

        let trusted = entries.iter().any(|entry| {
            host_matches_patterns(host, entry.host_patterns())
                && entry.public_key().to_bytes().as_deref() == Ok(hostkey)
        });
        if trusted {
            trace!("Host key for {} found in {}", host, self.known_hosts);
            Ok(CertificateCheckStatus::CertificateOk)
        } else {
            trace!("No entry in {} matched the host key of {}", self.known_hosts, host);
            Ok(CertificateCheckStatus::CertificatePassthrough)
        }
    }
}

/// Plain and negated host patterns only; wildcards and hashed names never match.
fn host_matches_patterns(host: &str, patterns: &HostPatterns) -> bool {
    let HostPatterns::Patterns(patterns) = patterns else {
        return false;
    };
    let host = host.to_lowercase();
    let mut matched = false;
    for pattern in patterns {
        let pattern = pattern.to_lowercase();
        match pattern.strip_prefix('!') {
            Some(negated) if negated == host => return false,
            Some(_) => {}
            None => matched |= pattern == host,
        }
    }
    matched
}
