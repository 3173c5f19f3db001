use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use crossbeam::channel::Sender;

use crate::arp::{AddressBroadcaster, AddressResolver, InterfaceAddress};
use crate::constants::{DIR_SYS_CLASS_NET, SYS_NET_ADDRESS, SYS_NET_DEVICE};
use crate::dns::DnsResolver;
use crate::fs::FileSystem;
use crate::http::{HttpResponse, HttpTransport};
use crate::net_manager::NetworkPlatform;
use crate::settings::Networks;
use crate::system::CmdRunner;

#[derive(Default)]
struct FsState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    symlinks: BTreeMap<PathBuf, PathBuf>,
    write_count: usize,
    list_error: Option<String>,
    write_error: Option<String>,
    write_errors: HashMap<PathBuf, String>,
    symlink_error: Option<String>,
}

#[derive(Default)]
pub struct FakeFileSystem {
    state: Mutex<FsState>,
}

impl FakeFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_network_device(&self, name: &str, mac: &str, is_physical: bool) {
        let dir = Path::new(DIR_SYS_CLASS_NET).join(name);
        self.write_string(dir.join(SYS_NET_ADDRESS), &format!("{}\n", mac));
        if is_physical {
            self.write_string(dir.join(SYS_NET_DEVICE), "");
        }
    }

    pub fn write_string<P: AsRef<Path>>(&self, path: P, contents: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .files
            .insert(path.as_ref().to_path_buf(), contents.as_bytes().to_vec());
    }

    pub fn file_string<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(path.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn symlink_target<P: AsRef<Path>>(&self, path: P) -> Option<PathBuf> {
        let state = self.state.lock().unwrap();
        state.symlinks.get(path.as_ref()).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().write_count
    }

    pub fn set_list_error(&self, message: &str) {
        self.state.lock().unwrap().list_error = Some(message.into());
    }

    pub fn set_write_error(&self, message: &str) {
        self.state.lock().unwrap().write_error = Some(message.into());
    }

    pub fn set_write_error_for<P: AsRef<Path>>(&self, path: P, message: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .write_errors
            .insert(path.as_ref().to_path_buf(), message.into());
    }

    pub fn set_symlink_error(&self, message: &str) {
        self.state.lock().unwrap().symlink_error = Some(message.into());
    }
}

impl FileSystem for FakeFileSystem {
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.list_error {
            return Err(anyhow!("{}", message));
        }
        let children: BTreeSet<PathBuf> = state
            .files
            .keys()
            .chain(state.symlinks.keys())
            .filter_map(|path| match path.strip_prefix(dir).ok()?.components().next()? {
                Component::Normal(name) => Some(dir.join(name)),
                _ => None,
            })
            .collect();
        Ok(children.into_iter().collect())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        state
            .files
            .keys()
            .chain(state.symlinks.keys())
            .any(|p| p.starts_with(path))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("unable to read {:?}: no such file", path))
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.write_errors.get(path).or(state.write_error.as_ref()) {
            return Err(anyhow!("unable to write {:?}: {}", path, message));
        }
        state.files.insert(path.to_path_buf(), contents.to_vec());
        state.write_count += 1;
        Ok(())
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        let state = self.state.lock().unwrap();
        state
            .symlinks
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("unable to read link {:?}: no such link", path))
    }

    fn symlink(&self, target: &Path, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.symlink_error {
            return Err(anyhow!("unable to link {:?}: {}", path, message));
        }
        state
            .symlinks
            .insert(path.to_path_buf(), target.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
struct CmdState {
    commands: Vec<Vec<String>>,
    arg_errors: HashMap<String, String>,
}

#[derive(Default)]
pub struct FakeCmdRunner {
    state: Mutex<CmdState>,
}

impl FakeCmdRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn set_error_for_arg(&self, arg: &str, message: &str) {
        let mut state = self.state.lock().unwrap();
        state.arg_errors.insert(arg.into(), message.into());
    }
}

impl CmdRunner for FakeCmdRunner {
    fn run_command(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let mut command = vec![cmd.to_string()];
        command.extend(args.iter().map(|a| a.to_string()));
        state.commands.push(command);

        if let Some(message) = args.iter().find_map(|a| state.arg_errors.get(*a)) {
            return Err(anyhow!("{}", message));
        }
        Ok(String::new())
    }
}

#[derive(Default)]
pub struct FakeAddressResolver {
    addresses: Mutex<HashMap<String, Ipv4Addr>>,
}

impl FakeAddressResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_address(&self, interface: &str, ip: Ipv4Addr) {
        self.addresses.lock().unwrap().insert(interface.into(), ip);
    }
}

impl AddressResolver for FakeAddressResolver {
    fn primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr> {
        self.addresses
            .lock()
            .unwrap()
            .get(interface)
            .copied()
            .ok_or_else(|| anyhow!("no address for {}", interface))
    }
}

#[derive(Default)]
pub struct FakeAddressBroadcaster {
    broadcasts: Mutex<Vec<Vec<InterfaceAddress>>>,
    error: Mutex<Option<String>>,
}

impl FakeAddressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broadcasts(&self) -> Vec<Vec<InterfaceAddress>> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn set_error(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.into());
    }
}

impl AddressBroadcaster for FakeAddressBroadcaster {
    fn broadcast_mac_addresses(&self, addresses: Vec<InterfaceAddress>) -> Result<()> {
        self.broadcasts.lock().unwrap().push(addresses);
        match self.error.lock().unwrap().as_ref() {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct HttpState {
    responses: VecDeque<Result<HttpResponse, String>>,
    requests: Vec<(String, Vec<(String, String)>)>,
}

#[derive(Default)]
pub struct FakeHttpTransport {
    state: Mutex<HttpState>,
}

impl FakeHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.state.lock().unwrap().responses.push_back(Ok(response));
    }

    pub fn push_error(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl HttpTransport for FakeHttpTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let mut state = self.state.lock().unwrap();
        state.requests.push((url.into(), headers.to_vec()));
        match state.responses.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!("{}", message)),
            None => Err(anyhow!("no response queued for {}", url)),
        }
    }
}

#[derive(Default)]
pub struct FakeDnsResolver {
    addresses: Mutex<HashMap<String, String>>,
    lookups: Mutex<Vec<(Vec<String>, String)>>,
}

impl FakeDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_address(&self, host: &str, ip: &str) {
        self.addresses.lock().unwrap().insert(host.into(), ip.into());
    }

    pub fn lookups(&self) -> Vec<(Vec<String>, String)> {
        self.lookups.lock().unwrap().clone()
    }
}

impl DnsResolver for FakeDnsResolver {
    fn lookup_host(&self, servers: &[String], host: &str) -> Result<String> {
        self.lookups
            .lock()
            .unwrap()
            .push((servers.to_vec(), host.into()));
        self.addresses
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .ok_or_else(|| anyhow!("unable to resolve {}", host))
    }
}

#[derive(Default)]
struct PlatformState {
    configured: Vec<String>,
    configured_error: Option<String>,
    setup_error: Option<String>,
    setups: Vec<Networks>,
}

#[derive(Default)]
pub struct FakeNetworkPlatform {
    state: Mutex<PlatformState>,
}

impl FakeNetworkPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_configured_interfaces(&self, interfaces: &[&str]) {
        self.state.lock().unwrap().configured = interfaces.iter().map(|i| i.to_string()).collect();
    }

    pub fn set_configured_error(&self, message: &str) {
        self.state.lock().unwrap().configured_error = Some(message.into());
    }

    pub fn set_setup_error(&self, message: &str) {
        self.state.lock().unwrap().setup_error = Some(message.into());
    }

    pub fn setups(&self) -> Vec<Networks> {
        self.state.lock().unwrap().setups.clone()
    }
}

impl NetworkPlatform for FakeNetworkPlatform {
    fn configured_network_interfaces(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        match &state.configured_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(state.configured.clone()),
        }
    }

    fn setup_networking(
        &self,
        networks: &Networks,
        result_tx: Option<Sender<Result<()>>>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.setups.push(networks.clone());
        if let Some(message) = &state.setup_error {
            return Err(anyhow!("{}", message));
        }
        if let Some(tx) = result_tx {
            let _ = tx.send(Ok(()));
        }
        Ok(())
    }
}
