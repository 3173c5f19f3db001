pub const DIR_SYS_CLASS_NET: &str = "/sys/class/net";
pub const DIR_NETWORK_SCRIPTS: &str = "/etc/sysconfig/network-scripts";
pub const DIR_ETC_DHCP: &str = "/etc/dhcp";
pub const DIR_METADATA_CACHE: &str = "/var/vcap/bosh";

pub const FILE_CONFIG: &str = "/etc/netstrap/config.json";
pub const FILE_DHCLIENT_CONF: &str = "/etc/dhcp/dhclient.conf";
pub const FILE_ETC_NETWORK_INTERFACES: &str = "/etc/network/interfaces";

pub const SYS_NET_ADDRESS: &str = "address";
pub const SYS_NET_DEVICE: &str = "device";

pub const CACHE_FILE_PREFIX: &str = "http-metadata-service-";

pub const DEFAULT_INTERFACE: &str = "eth0";
pub const DEFAULT_METADATA_HOST: &str = "http://169.254.169.254";
pub const DEFAULT_USER_DATA_PATH: &str = "/latest/user-data";
pub const DEFAULT_INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";
pub const DEFAULT_SSH_KEYS_PATH: &str = "/latest/meta-data/public-keys/0/openssh-key";

pub const ENV_PATH: &str = "/usr/local/bin:/usr/local/sbin:/usr/bin:/usr/sbin:/bin:/sbin";

pub const CMD_ARPING: &str = "arping";
pub const CMD_SERVICE: &str = "service";
