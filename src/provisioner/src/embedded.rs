//! Shell templates compiled into the binary, keyed by step name.

pub const ALL_TEMPLATES: &[(&str, &str)] = &[
    (
        "download_kubernetes_binary",
        include_str!("../templates/download_kubernetes_binary.sh"),
    ),
    (
        "write_certificates",
        include_str!("../templates/write_certificates.sh"),
    ),
    (
        "add_authorized_keys",
        include_str!("../templates/add_authorized_keys.sh"),
    ),
    ("cni_tools", include_str!("../templates/cni_tools.sh")),
    ("kubelet", include_str!("../templates/kubelet.sh")),
    ("kubeproxy", include_str!("../templates/kubeproxy.sh")),
    ("manifest", include_str!("../templates/manifest.sh")),
    ("kubeadm", include_str!("../templates/kubeadm.sh")),
    ("post_start", include_str!("../templates/post_start.sh")),
    ("drain", include_str!("../templates/drain.sh")),
    ("configmap", include_str!("../templates/configmap.sh")),
    ("cluster_check", include_str!("../templates/cluster_check.sh")),
];
