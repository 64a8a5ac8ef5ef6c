use std::rc::Rc;

use log::info;
use web_sys::window;
use yew::prelude::*;

use prism_frontend::components::cookie_banner::{ConsentHandle, CookieConsent};
use prism_frontend::config::{self, ConsentConfig};
use prism_frontend::consent::{Category, ConsentStore, FeatureGates, ScriptIntegration};

/// Element in the static landing page the consent UI mounts into.
const MOUNT_ID: &str = "cookie-consent-root";

#[derive(Properties, PartialEq)]
struct AppProps {
    store: ConsentHandle,
}

#[function_component(App)]
fn app(props: &AppProps) -> Html {
    let banner_open = use_state(|| !props.store.has_consent());

    let on_open_change = {
        let banner_open = banner_open.clone();
        Callback::from(move |open: bool| banner_open.set(open))
    };

    html! {
        <CookieConsent
            store={props.store.clone()}
            open={*banner_open}
            on_open_change={on_open_change}
        />
    }
}

fn main() {
    // Initialize console error panic hook for better error messages
    console_error_panic_hook::set_once();

    // Initialize logging
    console_log::init_with_level(config::log_level()).expect("error initializing log");

    info!("Initializing cookie consent...");
    let store = Rc::new(ConsentStore::for_browser(ConsentConfig::default()));

    let gates = Rc::new(
        FeatureGates::new()
            .with(ScriptIntegration::from_meta(
                Category::Analytics,
                "Analytics",
                config::ANALYTICS_SRC_META,
            ))
            .with(ScriptIntegration::from_meta(
                Category::Marketing,
                "Marketing",
                config::MARKETING_SRC_META,
            )),
    );
    gates.attach(&store);

    match store.load() {
        Some(record) => {
            info!("User has existing consent, not showing banner");
            gates.apply(Some(&record));
        }
        None => info!("No consent found, showing banner"),
    }

    let props = AppProps { store: ConsentHandle::new(store) };
    let root = window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(MOUNT_ID));
    match root {
        Some(root) => {
            yew::Renderer::<App>::with_root_and_props(root, props).render();
        }
        None => {
            yew::Renderer::<App>::with_props(props).render();
        }
    }
}
